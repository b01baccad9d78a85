//! Inventory sync: keeps the instance store in step with provider listings

use crate::health::{components, HealthRegistry};
use crate::observability::SnoozeMetrics;
use crate::provider::ProviderRegistry;
use crate::store::InstanceStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counts from one sync pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub discovered: usize,
    pub upserted: usize,
    pub failed_instances: usize,
    pub failed_providers: Vec<String>,
}

/// Periodic discovery of databases across all provider connections
pub struct InventorySync {
    providers: Arc<ProviderRegistry>,
    instances: Arc<dyn InstanceStore>,
    interval: Duration,
    metrics: SnoozeMetrics,
    health: Option<HealthRegistry>,
}

impl InventorySync {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        instances: Arc<dyn InstanceStore>,
        interval: Duration,
    ) -> Self {
        Self {
            providers,
            instances,
            interval,
            metrics: SnoozeMetrics::new(),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// List every connection and upsert what it reports. A failing
    /// connection or instance is counted, never fatal.
    pub async fn run_once(&self) -> Result<SyncReport> {
        let discovery = self.providers.list_all_databases().await;
        let mut report = SyncReport {
            discovered: discovery.instances.len(),
            failed_providers: discovery.failed_providers,
            ..Default::default()
        };

        for instance in discovery.instances {
            let id = instance.id.clone();
            match self.instances.upsert_instance(instance).await {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    report.failed_instances += 1;
                    self.metrics.inc_inventory_errors();
                    warn!(instance_id = %id, error = %e, "Failed to upsert instance");
                }
            }
        }

        for _ in &report.failed_providers {
            self.metrics.inc_inventory_errors();
        }
        self.metrics.set_instances_tracked(report.upserted as i64);

        debug!(
            discovered = report.discovered,
            upserted = report.upserted,
            failed_instances = report.failed_instances,
            failed_providers = report.failed_providers.len(),
            "Inventory sync complete"
        );
        Ok(report)
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            providers = self.providers.len(),
            "Starting inventory sync"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.run_once().await;
                    self.record(&outcome).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down inventory sync");
                    break;
                }
            }
        }
    }

    async fn record(&self, outcome: &Result<SyncReport>) {
        let Some(health) = &self.health else {
            return;
        };

        match outcome {
            Ok(report) if report.failed_providers.is_empty() => {
                health.pass_succeeded(components::INVENTORY).await;
                health.pass_succeeded(components::PROVIDERS).await;
            }
            Ok(report) => {
                health.pass_succeeded(components::INVENTORY).await;
                health
                    .pass_failed(
                        components::PROVIDERS,
                        format!("listing failed for {}", report.failed_providers.join(", ")),
                    )
                    .await;
            }
            Err(e) => {
                health
                    .pass_failed(components::INVENTORY, format!("{:#}", e))
                    .await;
            }
        }
    }
}
