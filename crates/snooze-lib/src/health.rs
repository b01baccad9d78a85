//! Health of the daemon's background loops
//!
//! Every loop reports the outcome of each pass here. A failed pass degrades
//! its component and [`UNHEALTHY_AFTER`] failures in a row make it
//! unhealthy; one successful pass clears the streak. The daemon serves the
//! aggregate on its liveness and readiness endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failed passes before a component counts as unhealthy
pub const UNHEALTHY_AFTER: u32 = 3;

/// Ordered best to worst, so the aggregate is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Recent passes failed but the loop keeps running
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed passes since the last successful one
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn registered(now: DateTime<Utc>) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_success: None,
            updated_at: now,
        }
    }

    fn pass_succeeded(&mut self, now: DateTime<Utc>) {
        self.status = ComponentStatus::Healthy;
        self.message = None;
        self.consecutive_failures = 0;
        self.last_success = Some(now);
        self.updated_at = now;
    }

    fn pass_failed(&mut self, message: String, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.status = if self.consecutive_failures >= UNHEALTHY_AFTER {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        self.message = Some(message);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Names of the daemon's background loops
pub mod components {
    pub const SCHEDULER: &str = "scheduler";
    pub const ANALYZER: &str = "analyzer";
    pub const INVENTORY: &str = "inventory";
    pub const PROVIDERS: &str = "providers";

    pub const ALL: [&str; 4] = [SCHEDULER, ANALYZER, INVENTORY, PROVIDERS];
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared view of component health; clones point at the same state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every daemon loop registered as healthy
    pub async fn with_default_components() -> Self {
        let registry = Self::new();
        for name in components::ALL {
            registry.register(name).await;
        }
        registry
    }

    pub async fn register(&self, name: &str) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::registered(Utc::now()));
    }

    /// Record the outcome of one pass of `name`
    pub async fn report<T, E: Display>(&self, name: &str, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.pass_succeeded(name).await,
            Err(e) => self.pass_failed(name, format!("{:#}", e)).await,
        }
    }

    pub async fn pass_succeeded(&self, name: &str) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state
            .components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::registered(now))
            .pass_succeeded(now);
    }

    pub async fn pass_failed(&self, name: &str, message: impl Into<String>) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state
            .components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::registered(now))
            .pass_failed(message.into(), now);
    }

    /// Mark `name` unhealthy without waiting for a failure streak
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let health = state
            .components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::registered(now));
        health.status = ComponentStatus::Unhealthy;
        health.message = Some(message.into());
        health.updated_at = now;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once the daemon has started its loops and none is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Daemon not yet initialized".to_string()),
            };
        }

        let unhealthy = state
            .components
            .iter()
            .find(|(_, health)| health.status == ComponentStatus::Unhealthy);

        match unhealthy {
            Some((name, health)) => ReadinessResponse {
                ready: false,
                reason: Some(format!(
                    "{} unhealthy: {}",
                    name,
                    health.message.as_deref().unwrap_or("no detail")
                )),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
