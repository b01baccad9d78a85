//! File-backed inventory
//!
//! The daemon reads a JSON document listing provider connections and their
//! databases, along with schedules, hourly metrics and overrides. Each
//! connection becomes a [`LocalProvider`] whose start/stop calls flip the
//! database status in memory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use snooze_lib::models::{HourlyMetric, Instance, Override, Schedule};
use snooze_lib::provider::{is_managed, Provider, ProviderRegistry};
use snooze_lib::store::{
    InMemoryEventStore, InMemoryInstanceStore, InMemoryMetricsStore, InMemoryOverrideStore,
    InMemoryRecommendationStore, InMemoryScheduleStore,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub metrics: Vec<HourlyMetric>,
    #[serde(default)]
    pub overrides: Vec<Override>,
}

/// One provider connection, named `<provider>_<account>[_<region>]`
#[derive(Debug, Deserialize)]
pub struct Connection {
    pub name: String,
    #[serde(default)]
    pub databases: Vec<Database>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub provider_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub hourly_cost_cents: i64,
}

fn default_status() -> String {
    "available".to_string()
}

impl InventoryFile {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading inventory {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing inventory {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Provider connection backed by the inventory file
pub struct LocalProvider {
    databases: DashMap<String, Database>,
    managed_tags: Vec<String>,
}

impl LocalProvider {
    pub fn new(databases: Vec<Database>, managed_tags: Vec<String>) -> Self {
        Self {
            databases: databases
                .into_iter()
                .map(|db| (db.provider_id.clone(), db))
                .collect(),
            managed_tags,
        }
    }

    fn set_status(&self, provider_id: &str, status: &str) -> Result<()> {
        let mut db = self
            .databases
            .get_mut(provider_id)
            .with_context(|| format!("database {} not found", provider_id))?;
        debug!(provider_id = %provider_id, from = %db.status, to = %status, "Database status changed");
        db.status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl Provider for LocalProvider {
    async fn list_databases(&self) -> Result<Vec<Instance>> {
        let mut instances: Vec<Instance> = self
            .databases
            .iter()
            .map(|entry| {
                let db = entry.value();
                Instance {
                    id: String::new(),
                    provider_id: db.provider_id.clone(),
                    provider: String::new(),
                    provider_name: String::new(),
                    account_id: String::new(),
                    name: db.name.clone().unwrap_or_else(|| db.provider_id.clone()),
                    region: db.region.clone(),
                    engine: db.engine.clone(),
                    instance_type: db.instance_type.clone(),
                    status: db.status.clone(),
                    tags: db.tags.clone(),
                    hourly_cost_cents: db.hourly_cost_cents,
                    managed: is_managed(&db.tags, &self.managed_tags),
                }
            })
            .collect();
        instances.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        Ok(instances)
    }

    async fn start_database(&self, provider_id: &str) -> Result<()> {
        self.set_status(provider_id, "available")
    }

    async fn stop_database(&self, provider_id: &str) -> Result<()> {
        self.set_status(provider_id, "stopped")
    }

    async fn get_database_status(&self, provider_id: &str) -> Result<String> {
        self.databases
            .get(provider_id)
            .map(|db| db.status.clone())
            .with_context(|| format!("database {} not found", provider_id))
    }
}

/// Stores and provider connections shared by the daemon's loops
pub struct Collaborators {
    pub providers: Arc<ProviderRegistry>,
    pub instances: Arc<InMemoryInstanceStore>,
    pub schedules: Arc<InMemoryScheduleStore>,
    pub metrics: Arc<InMemoryMetricsStore>,
    pub events: Arc<InMemoryEventStore>,
    pub overrides: Arc<InMemoryOverrideStore>,
    pub recommendations: Arc<InMemoryRecommendationStore>,
}

impl Collaborators {
    pub fn from_inventory(inventory: InventoryFile, managed_tags: &[String]) -> Self {
        let providers = Arc::new(ProviderRegistry::new());
        for connection in inventory.connections {
            providers.register(
                connection.name,
                Arc::new(LocalProvider::new(
                    connection.databases,
                    managed_tags.to_vec(),
                )),
            );
        }

        let mut schedules = Vec::new();
        for schedule in inventory.schedules {
            match schedule.validate() {
                Ok(()) => schedules.push(schedule),
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "Skipping invalid schedule")
                }
            }
        }

        let metrics = InMemoryMetricsStore::new();
        metrics.extend(inventory.metrics);

        let overrides = InMemoryOverrideStore::new();
        for o in inventory.overrides {
            overrides.add(o);
        }
        let expired = overrides.expire(Utc::now());
        if expired > 0 {
            info!(expired, "Expired stale overrides");
        }

        info!(
            connections = providers.len(),
            schedules = schedules.len(),
            "Inventory loaded"
        );

        Self {
            providers,
            instances: Arc::new(InMemoryInstanceStore::new()),
            schedules: Arc::new(InMemoryScheduleStore::with_schedules(schedules)),
            metrics: Arc::new(metrics),
            events: Arc::new(InMemoryEventStore::new()),
            overrides: Arc::new(overrides),
            recommendations: Arc::new(InMemoryRecommendationStore::new()),
        }
    }
}
