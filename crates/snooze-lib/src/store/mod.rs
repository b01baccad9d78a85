//! Collaborator interfaces consumed by the scheduler and the analyzer
//!
//! Persistence lives outside this crate. The scheduler and analyzer only
//! see these traits; [`memory`] provides in-process implementations.

pub mod memory;

use crate::analyzer::MIN_DATA_HOURS;
use crate::models::{
    EventType, HourlyMetric, Instance, Recommendation, RecommendationStatus, Schedule,
    TriggeredBy,
};
use crate::scheduler::Action;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{
    InMemoryEventStore, InMemoryInstanceStore, InMemoryMetricsStore, InMemoryOverrideStore,
    InMemoryRecommendationStore, InMemoryScheduleStore,
};

/// Read-mostly view of discovered instances
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>>;

    /// Insert or refresh an instance from provider discovery
    async fn upsert_instance(&self, instance: Instance) -> Result<()>;
}

/// Audit event to record before a provider call
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub instance_id: String,
    pub event_type: EventType,
    pub triggered_by: TriggeredBy,
    pub previous_status: String,
    pub new_status: String,
    pub metadata: serde_json::Value,
}

/// Write side of the audit trail
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Record an event, returning its id
    async fn create_event(&self, event: NewEvent) -> Result<String>;

    /// Merge outcome details (e.g. a provider error) into an event's metadata
    async fn annotate_event(&self, event_id: &str, metadata: serde_json::Value) -> Result<()>;
}

/// Read side of the hourly metrics time series
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn get_metrics_by_instance(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HourlyMetric>>;

    /// Distinct clock hours of data stored for the instance
    async fn data_hours(&self, instance_id: &str) -> Result<usize>;

    /// At least 24 distinct hours of data exist for the instance
    async fn has_sufficient_data(&self, instance_id: &str) -> Result<bool> {
        Ok(self.data_hours(instance_id).await? >= MIN_DATA_HOURS)
    }
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_schedules(&self) -> Result<Vec<Schedule>>;

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>>;

    async fn create_schedule(&self, schedule: Schedule) -> Result<()>;

    async fn update_schedule(&self, schedule: Schedule) -> Result<()>;

    async fn delete_schedule(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn get_recommendation(&self, id: &str) -> Result<Option<Recommendation>>;

    async fn list_recommendations(&self) -> Result<Vec<Recommendation>>;

    async fn list_by_status(&self, status: RecommendationStatus) -> Result<Vec<Recommendation>>;

    async fn create_recommendation(&self, recommendation: Recommendation) -> Result<()>;

    async fn update_recommendation(&self, recommendation: Recommendation) -> Result<()>;
}

/// Manual override check. Opaque to the scheduler beyond this boolean.
#[async_trait]
pub trait OverrideGate: Send + Sync {
    async fn has_active_override(
        &self,
        instance_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Gate that never blocks an action
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

#[async_trait]
impl OverrideGate for NoOverrides {
    async fn has_active_override(
        &self,
        _instance_id: &str,
        _action: Action,
        _now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(false)
    }
}
