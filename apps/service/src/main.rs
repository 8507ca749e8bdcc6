use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::interval;
use tracing::{debug, error, info};

use portwatch_service::config::Config;
use portwatch_service::database::{self, Registry, ScheduleStore, ServiceStore};
use portwatch_service::monitoring::{Orchestrator, Prober};
use portwatch_service::watchdog::{self, WatchdogEntry};
use portwatch_service::pool;

#[derive(Parser)]
#[command(name = "portwatch", about = "Network service watchdog")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();

    let args = Args::parse();
    let config = Config::from_config(args.config).context("failed to load configuration")?;
    info!("{config}");

    let pool = pool::build_pool(&config.database.path).await?;

    info!("Initializing database schema...");
    let conn = pool.get().await?;
    database::initialize_database(&conn).await?;
    drop(conn);

    let registry = Arc::new(Registry::new(pool));
    let services: Arc<dyn ServiceStore> = registry.clone();
    let schedules: Arc<dyn ScheduleStore> = registry;

    let prober =
        Arc::new(Prober::new(Duration::from_secs(config.watchdog.probe_timeout_seconds)));
    let orchestrator = Orchestrator::new(services.clone(), prober);

    info!("portwatch service started");
    run_triggers(&config, orchestrator, services, schedules).await
}

/// Periodic triggers for the monitoring run and the decay sweep.
///
/// Both fire on independent fixed intervals; the schedule entry decides
/// which of them actually does work. Probe tasks are dispatched
/// fire-and-forget, so a tick returns as soon as dispatch is done.
async fn run_triggers(
    config: &Config,
    orchestrator: Orchestrator,
    services: Arc<dyn ServiceStore>,
    schedules: Arc<dyn ScheduleStore>,
) -> Result<()> {
    let mut run_timer = interval(Duration::from_secs(config.watchdog.run_interval_seconds));
    let mut decay_timer = interval(Duration::from_secs(config.watchdog.decay_interval_seconds));

    loop {
        tokio::select! {
            _ = run_timer.tick() => {
                match WatchdogEntry::load(schedules.clone()).await {
                    Ok(entry) if entry.enabled() => {
                        if let Err(e) = orchestrator.run().await {
                            error!("monitoring run aborted: {e}");
                        }
                    }
                    Ok(_) => debug!("watchdog disabled, skipping monitoring run"),
                    Err(e) => error!("watchdog schedule unavailable: {e}"),
                }
            }
            _ = decay_timer.tick() => {
                if let Err(e) = watchdog::decay_sweep(&services, &schedules).await {
                    error!("decay sweep aborted: {e}");
                }
            }
        }
    }
}
