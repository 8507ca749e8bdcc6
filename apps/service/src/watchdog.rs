//! Watchdog schedule controller.
//!
//! The monitoring runs are gated by a single named schedule entry in the
//! schedule store. While the watchdog is disabled, the decay sweep walks
//! the registry and lets every status fall back to `unknown`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::database::models::{ServiceStatus, WatchdogSchedule};
use crate::database::{ScheduleStore, ServiceStore};
use crate::error::{ScheduleError, StoreError};

/// Fixed name of the schedule entry owning the monitoring runs.
pub const WATCHDOG_ENTRY_NAME: &str = "watchdog-task";

/// Handle to the watchdog schedule entry.
///
/// Loading fails with [`ScheduleError`] when the store is unreachable or
/// the entry is missing; callers must treat that as "monitoring subsystem
/// unavailable", not as "watchdog is off".
pub struct WatchdogEntry {
    store: Arc<dyn ScheduleStore>,
    entry: WatchdogSchedule,
}

impl WatchdogEntry {
    pub async fn load(store: Arc<dyn ScheduleStore>) -> Result<Self, ScheduleError> {
        let entry = store.load(WATCHDOG_ENTRY_NAME).await?;
        Ok(Self { store, entry })
    }

    pub fn enabled(&self) -> bool {
        self.entry.enabled
    }

    /// Idempotent last-writer-wins write of the enabled flag.
    pub async fn enable(&mut self) -> Result<(), ScheduleError> {
        self.entry.enabled = true;
        self.store.save(&self.entry).await
    }

    pub async fn disable(&mut self) -> Result<(), ScheduleError> {
        self.entry.enabled = false;
        self.store.save(&self.entry).await
    }
}

/// Decay services to `unknown` while the watchdog is off.
///
/// Runs on its own fixed interval regardless of enablement: a no-op while
/// the watchdog is on, otherwise a sweep over the whole registry. The
/// enablement flag is re-read per service so a watchdog started mid-sweep
/// aborts the sweep early instead of racing the orchestrator.
pub async fn decay_sweep(
    registry: &Arc<dyn ServiceStore>,
    schedules: &Arc<dyn ScheduleStore>,
) -> Result<(), StoreError> {
    let entry = match schedules.load(WATCHDOG_ENTRY_NAME).await {
        Ok(entry) => entry,
        Err(e) => {
            tracing::error!("decay sweep skipped, schedule unavailable: {e}");
            return Ok(());
        }
    };
    if entry.enabled {
        debug!("watchdog enabled, nothing to decay");
        return Ok(());
    }

    for service in registry.all().await? {
        match schedules.load(WATCHDOG_ENTRY_NAME).await {
            Ok(entry) if entry.enabled => {
                info!("watchdog started mid-sweep, aborting decay");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("decay sweep aborted, schedule unavailable: {e}");
                return Ok(());
            }
        }

        if service.status != ServiceStatus::Unknown {
            registry.set_status(service.id, ServiceStatus::Unknown).await?;
            info!(service = %service.name, from = %service.status, "status decayed to unknown");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::database::models::{Host, HostKind, Proto, ServiceDefinition};
    use crate::database::testutil::test_registry;

    /// Schedule stub reporting disabled for the first `disabled_loads`
    /// reads and enabled from then on.
    struct FlippingSchedule {
        loads: AtomicUsize,
        disabled_loads: usize,
    }

    impl FlippingSchedule {
        fn new(disabled_loads: usize) -> Self {
            Self { loads: AtomicUsize::new(0), disabled_loads }
        }
    }

    #[async_trait]
    impl ScheduleStore for FlippingSchedule {
        async fn load(&self, name: &str) -> Result<WatchdogSchedule, ScheduleError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(WatchdogSchedule {
                name: name.to_string(),
                enabled: n > self.disabled_loads,
                interval_seconds: 30,
            })
        }

        async fn save(&self, _entry: &WatchdogSchedule) -> Result<(), ScheduleError> {
            Ok(())
        }
    }

    fn definition(name: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            host: Host { kind: HostKind::Ip, value: "192.168.1.1".into() },
            port: "123".into(),
            proto: Proto::Tcp,
        }
    }

    #[tokio::test]
    async fn toggling_is_idempotent() {
        let (registry, _dir) = test_registry().await;
        let schedules: Arc<dyn ScheduleStore> = registry.clone();

        let mut entry = WatchdogEntry::load(schedules.clone()).await.unwrap();
        assert!(!entry.enabled());

        entry.enable().await.unwrap();
        entry.enable().await.unwrap();
        assert!(WatchdogEntry::load(schedules.clone()).await.unwrap().enabled());

        entry.disable().await.unwrap();
        assert!(!WatchdogEntry::load(schedules).await.unwrap().enabled());
    }

    #[tokio::test]
    async fn sweep_decays_non_unknown_statuses_while_disabled() {
        let (registry, _dir) = test_registry().await;
        let services: Arc<dyn ServiceStore> = registry.clone();
        let schedules: Arc<dyn ScheduleStore> = registry.clone();

        let a = services.insert(&definition("svc-a")).await.unwrap();
        let b = services.insert(&definition("svc-b")).await.unwrap();
        services.set_status(a.id, ServiceStatus::Up).await.unwrap();
        services.set_status(b.id, ServiceStatus::Down).await.unwrap();

        decay_sweep(&services, &schedules).await.unwrap();

        for id in [a.id, b.id] {
            let service = services.get(id).await.unwrap().unwrap();
            assert_eq!(service.status, ServiceStatus::Unknown);
        }
    }

    #[tokio::test]
    async fn sweep_is_a_noop_while_enabled() {
        let (registry, _dir) = test_registry().await;
        let services: Arc<dyn ServiceStore> = registry.clone();
        let schedules: Arc<dyn ScheduleStore> = registry.clone();

        let a = services.insert(&definition("svc-a")).await.unwrap();
        services.set_status(a.id, ServiceStatus::Up).await.unwrap();

        WatchdogEntry::load(schedules.clone()).await.unwrap().enable().await.unwrap();
        decay_sweep(&services, &schedules).await.unwrap();

        let service = services.get(a.id).await.unwrap().unwrap();
        assert_eq!(service.status, ServiceStatus::Up);
    }

    /// A watchdog started while the sweep walks the registry stops the
    /// sweep before the next service is touched. The first two schedule
    /// reads (the gate check plus the re-check before the first decay)
    /// report disabled, every later read reports enabled.
    #[tokio::test]
    async fn sweep_aborts_when_enabled_mid_sweep() {
        let (registry, _dir) = test_registry().await;
        let services: Arc<dyn ServiceStore> = registry.clone();
        let schedules: Arc<dyn ScheduleStore> = Arc::new(FlippingSchedule::new(2));

        let a = services.insert(&definition("svc-a")).await.unwrap();
        let b = services.insert(&definition("svc-b")).await.unwrap();
        services.set_status(a.id, ServiceStatus::Up).await.unwrap();
        services.set_status(b.id, ServiceStatus::Down).await.unwrap();

        decay_sweep(&services, &schedules).await.unwrap();

        let first = services.get(a.id).await.unwrap().unwrap();
        assert_eq!(first.status, ServiceStatus::Unknown);
        // The abort landed before the second service was reached.
        let second = services.get(b.id).await.unwrap().unwrap();
        assert_eq!(second.status, ServiceStatus::Down);
    }

    /// Re-enabling after a completed sweep does not restore prior status.
    #[tokio::test]
    async fn reenabling_does_not_undo_decay() {
        let (registry, _dir) = test_registry().await;
        let services: Arc<dyn ServiceStore> = registry.clone();
        let schedules: Arc<dyn ScheduleStore> = registry.clone();

        let a = services.insert(&definition("svc-a")).await.unwrap();
        services.set_status(a.id, ServiceStatus::Up).await.unwrap();

        decay_sweep(&services, &schedules).await.unwrap();
        WatchdogEntry::load(schedules.clone()).await.unwrap().enable().await.unwrap();

        let service = services.get(a.id).await.unwrap().unwrap();
        assert_eq!(service.status, ServiceStatus::Unknown);
    }
}
