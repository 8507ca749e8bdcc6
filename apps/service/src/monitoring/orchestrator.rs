use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::prober::{ProbeOutcome, Prober};
use crate::database::ServiceStore;
use crate::database::models::{Service, ServiceStatus};
use crate::error::StoreError;

/// Walks the registry and dispatches one detached probe task per service.
///
/// Dispatch is fire-and-forget: callers normally drop the returned
/// handles; tests await them to observe the applied transitions.
pub struct Orchestrator {
    registry: Arc<dyn ServiceStore>,
    prober: Arc<Prober>,
}

impl Orchestrator {
    pub fn new(registry: Arc<dyn ServiceStore>, prober: Arc<Prober>) -> Self {
        Self { registry, prober }
    }

    /// One monitoring run over the whole registry.
    ///
    /// A registry fetch failure aborts the run and is reported to the
    /// caller; the next schedule tick retries. Per-service probe failures
    /// stay local to their task and never abort the batch.
    pub async fn run(&self) -> Result<Vec<JoinHandle<()>>, StoreError> {
        let services = self.registry.all().await?;
        if services.is_empty() {
            debug!("no service documents in the registry");
            return Ok(Vec::new());
        }

        let handles = services
            .into_iter()
            .map(|service| {
                let registry = Arc::clone(&self.registry);
                let prober = Arc::clone(&self.prober);
                tokio::spawn(async move { check_service(registry, prober, service).await })
            })
            .collect();
        Ok(handles)
    }
}

/// Probe one service and apply the resulting status transition.
///
/// Transitions: `unknown|down -> up` on a successful probe, `up|unknown ->
/// down` on a failed probe or resolution failure. The status write happens
/// only on change; `last_tested`/`last_responded` always move on the
/// probed path. Store failures inside this task are logged and dropped.
async fn check_service(registry: Arc<dyn ServiceStore>, prober: Arc<Prober>, service: Service) {
    info!(service = %service.name, "started checking service");

    let outcome = prober.probe(&service.host, &service.port, service.proto).await;

    let reachable = match outcome {
        ProbeOutcome::ResolutionFailed { reason } => {
            warn!(service = %service.name, host = %service.host.value, %reason,
                "hostname resolution failed");
            // Early exit: only an up service is marked down, and
            // last_tested is intentionally left untouched on this path.
            if service.status == ServiceStatus::Up {
                match registry.set_status(service.id, ServiceStatus::Down).await {
                    Ok(()) => {
                        info!(service = %service.name, "service changed status to DOWN")
                    }
                    Err(e) => {
                        error!(service = %service.name, "failed to persist status: {e}")
                    }
                }
            }
            return;
        }
        ProbeOutcome::Reachable { addr } => {
            debug!(service = %service.name, %addr, "port open");
            true
        }
        ProbeOutcome::Unreachable { reason } => {
            debug!(service = %service.name, %reason, "port probe failed");
            false
        }
    };

    let now = Utc::now();
    if reachable {
        if let Err(e) = registry.touch_last_responded(service.id, now).await {
            error!(service = %service.name, "failed to persist last_responded: {e}");
        }
    }
    if let Err(e) = registry.touch_last_tested(service.id, now).await {
        error!(service = %service.name, "failed to persist last_tested: {e}");
    }

    let new_status = if reachable { ServiceStatus::Up } else { ServiceStatus::Down };
    if new_status != service.status {
        match registry.set_status(service.id, new_status).await {
            Ok(()) => info!(
                service = %service.name,
                from = %service.status,
                to = %new_status,
                "service changed status"
            ),
            Err(e) => error!(service = %service.name, "failed to persist status: {e}"),
        }
    }

    info!(service = %service.name, "service is {}", if reachable { "UP" } else { "DOWN" });
}
