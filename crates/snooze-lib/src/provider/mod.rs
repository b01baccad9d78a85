//! Cloud provider connections
//!
//! A [`Provider`] wraps one account/region (AWS) or project (GCP). The
//! [`ProviderRegistry`] keys connections by name, e.g.
//! `aws_123456789012_us-east-1`, and routes start/stop calls to them.

use crate::error::SnoozeError;
use crate::models::Instance;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Database operations a cloud provider connection supports
#[async_trait]
pub trait Provider: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<Instance>>;

    async fn start_database(&self, provider_id: &str) -> Result<()>;

    async fn stop_database(&self, provider_id: &str) -> Result<()>;

    async fn get_database_status(&self, provider_id: &str) -> Result<String>;
}

/// Split a connection name into provider type and account id.
/// `aws_123456789012_us-east-1` gives `("aws", "123456789012")`.
pub fn parse_provider_name(name: &str) -> (String, String) {
    let mut parts = name.splitn(3, '_');
    let provider = parts.next().unwrap_or_default().to_string();
    let account_id = parts.next().unwrap_or_default().to_string();
    (provider, account_id)
}

/// An instance opts into automation by carrying any of `managed_tags`.
/// With no managed tags configured, every instance is managed.
pub fn is_managed(tags: &HashMap<String, String>, managed_tags: &[String]) -> bool {
    managed_tags.is_empty() || managed_tags.iter().any(|tag| tags.contains_key(tag))
}

/// Instances gathered from every registered connection
#[derive(Debug, Default)]
pub struct Discovery {
    pub instances: Vec<Instance>,
    /// Connections whose listing failed
    pub failed_providers: Vec<String>,
}

/// Registry of provider connections keyed by connection name
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        debug!(provider_name = %name, "Registered provider connection");
        self.providers.insert(name, provider);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.providers.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Registered connection names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List databases from every connection, stamping each instance with the
    /// connection it came from. A failing connection is logged and reported
    /// in [`Discovery::failed_providers`]; the others still contribute.
    pub async fn list_all_databases(&self) -> Discovery {
        let mut discovery = Discovery::default();

        for name in self.names() {
            let Some(provider) = self.get(&name) else {
                continue;
            };

            match provider.list_databases().await {
                Ok(instances) => {
                    let (provider_type, account_id) = parse_provider_name(&name);
                    for mut instance in instances {
                        if instance.id.is_empty() {
                            instance.id = format!("{}/{}", name, instance.provider_id);
                        }
                        instance.provider = provider_type.clone();
                        instance.provider_name = name.clone();
                        instance.account_id = account_id.clone();
                        discovery.instances.push(instance);
                    }
                }
                Err(e) => {
                    warn!(provider_name = %name, error = %e, "Failed to list databases");
                    discovery.failed_providers.push(name);
                }
            }
        }

        discovery
    }

    fn require(&self, provider_name: &str) -> Result<Arc<dyn Provider>> {
        self.get(provider_name)
            .ok_or_else(|| SnoozeError::ProviderNotRegistered(provider_name.to_string()).into())
    }

    pub async fn start_database(&self, provider_name: &str, provider_id: &str) -> Result<()> {
        self.require(provider_name)?
            .start_database(provider_id)
            .await
    }

    pub async fn stop_database(&self, provider_name: &str, provider_id: &str) -> Result<()> {
        self.require(provider_name)?
            .stop_database(provider_id)
            .await
    }

    pub async fn get_database_status(&self, provider_name: &str, provider_id: &str) -> Result<String> {
        self.require(provider_name)?
            .get_database_status(provider_id)
            .await
    }
}
