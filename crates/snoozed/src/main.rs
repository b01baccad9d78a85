//! snoozed - database sleep/wake scheduler daemon
//!
//! Discovers databases from the configured provider connections, stops and
//! starts them on cron schedules, and periodically recommends schedules from
//! observed idle windows.

use anyhow::Result;
use snooze_lib::{
    analyzer::{AnalysisLoop, Analyzer},
    health::HealthRegistry,
    inventory::InventorySync,
    observability::StructuredLogger,
    scheduler::SchedulerLoop,
    store::ScheduleStore,
};
use snoozed::{
    api,
    config::SnoozeConfig,
    inventory::{Collaborators, InventoryFile},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SNOOZE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting snoozed");

    let config = SnoozeConfig::load()?;
    info!(
        inventory = %config.inventory_path.display(),
        dry_run = config.dry_run,
        "Daemon configured"
    );

    let health_registry = HealthRegistry::with_default_components().await;
    let logger = StructuredLogger::new(&config.service_name);

    let inventory = InventoryFile::load(&config.inventory_path).await?;
    let stores = Collaborators::from_inventory(inventory, &config.managed_tags());

    let sync = InventorySync::new(
        stores.providers.clone(),
        stores.instances.clone(),
        config.inventory_sync_interval(),
    )
    .with_health(health_registry.clone());
    if let Err(e) = sync.run_once().await {
        warn!(error = %format!("{:#}", e), "Initial inventory sync failed");
    }

    let scheduler = Arc::new(
        SchedulerLoop::builder()
            .schedules(stores.schedules.clone())
            .instances(stores.instances.clone())
            .events(stores.events.clone())
            .overrides(stores.overrides.clone())
            .providers(stores.providers.clone())
            .tick_interval(config.tick_interval())
            .dry_run(config.dry_run)
            .logger(logger.clone())
            .health(health_registry.clone())
            .build()?,
    );

    let analyzer = Arc::new(
        Analyzer::new(
            stores.instances.clone(),
            stores.metrics.clone(),
            stores.recommendations.clone(),
            stores.schedules.clone(),
            config.analyzer(),
        )
        .with_logger(logger.clone()),
    );
    let analysis = AnalysisLoop::new(analyzer, config.analysis_interval())
        .with_health(health_registry.clone());

    let schedule_count = stores.schedules.list_schedules().await?.len();
    logger.log_startup(SNOOZE_VERSION, schedule_count, stores.providers.len());

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), scheduler.clone()));

    let (shutdown_tx, _) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler.clone().run(shutdown_tx.subscribe()));
    let analysis_handle = tokio::spawn(analysis.run(shutdown_tx.subscribe()));
    let sync_handle = tokio::spawn(sync.run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    for (task, handle) in [
        ("scheduler", scheduler_handle),
        ("analysis", analysis_handle),
        ("inventory", sync_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(task, error = %e, "Task ended abnormally");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
