//! DashMap-backed store implementations
//!
//! Used by the daemon's file-backed inventory and by tests. Listing
//! operations return deterministic orderings.

use super::{
    EventStore, InstanceStore, MetricsStore, NewEvent, OverrideGate, RecommendationStore,
    ScheduleStore,
};
use crate::analyzer::count_data_hours;
use crate::models::{
    Event, HourlyMetric, Instance, Override, Recommendation, RecommendationRecord,
    RecommendationStatus, Schedule,
};
use crate::scheduler::Action;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryInstanceStore {
    instances: DashMap<String, Instance>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(instances: impl IntoIterator<Item = Instance>) -> Self {
        let store = Self::new();
        for instance in instances {
            store.instances.insert(instance.id.clone(), instance);
        }
        store
    }

    /// Overwrite the cached status, as a provider poll would
    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(mut instance) = self.instances.get_mut(id) {
            instance.status = status.to_string();
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let mut instances: Vec<Instance> =
            self.instances.iter().map(|e| e.value().clone()).collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>> {
        Ok(self.instances.get(id).map(|e| e.value().clone()))
    }

    async fn upsert_instance(&self, instance: Instance) -> Result<()> {
        self.instances.insert(instance.id.clone(), instance);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: DashMap<String, Event>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        events
    }

    pub fn get(&self, id: &str) -> Option<Event> {
        self.events.get(id).map(|e| e.value().clone())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create_event(&self, event: NewEvent) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.events.insert(
            id.clone(),
            Event {
                id: id.clone(),
                instance_id: event.instance_id,
                event_type: event.event_type,
                triggered_by: event.triggered_by,
                previous_status: event.previous_status,
                new_status: event.new_status,
                metadata: event.metadata,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn annotate_event(&self, event_id: &str, metadata: serde_json::Value) -> Result<()> {
        let mut event = self
            .events
            .get_mut(event_id)
            .with_context(|| format!("event not found: {}", event_id))?;

        match (&mut event.metadata, metadata) {
            (serde_json::Value::Object(existing), serde_json::Value::Object(extra)) => {
                existing.extend(extra);
            }
            (slot, other) => *slot = other,
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMetricsStore {
    metrics: DashMap<String, Vec<HourlyMetric>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, metric: HourlyMetric) {
        self.metrics
            .entry(metric.instance_id.clone())
            .or_default()
            .push(metric);
    }

    pub fn extend(&self, metrics: impl IntoIterator<Item = HourlyMetric>) {
        for metric in metrics {
            self.insert(metric);
        }
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn get_metrics_by_instance(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HourlyMetric>> {
        let mut metrics: Vec<HourlyMetric> = self
            .metrics
            .get(instance_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|m| m.hour >= start && m.hour <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        metrics.sort_by(|a, b| a.hour.cmp(&b.hour).then(a.metric_name.cmp(&b.metric_name)));
        Ok(metrics)
    }

    async fn data_hours(&self, instance_id: &str) -> Result<usize> {
        Ok(self
            .metrics
            .get(instance_id)
            .map(|series| count_data_hours(&series))
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct InMemoryScheduleStore {
    schedules: DashMap<String, Schedule>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: impl IntoIterator<Item = Schedule>) -> Self {
        let store = Self::new();
        for schedule in schedules {
            store.schedules.insert(schedule.id.clone(), schedule);
        }
        store
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> =
            self.schedules.iter().map(|e| e.value().clone()).collect();
        schedules.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(schedules)
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        Ok(self.schedules.get(id).map(|e| e.value().clone()))
    }

    async fn create_schedule(&self, schedule: Schedule) -> Result<()> {
        if self.schedules.contains_key(&schedule.id) {
            anyhow::bail!("schedule already exists: {}", schedule.id);
        }
        self.schedules.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<()> {
        let mut existing = self
            .schedules
            .get_mut(&schedule.id)
            .with_context(|| format!("schedule not found: {}", schedule.id))?;
        *existing = schedule;
        Ok(())
    }

    async fn delete_schedule(&self, id: &str) -> Result<()> {
        self.schedules
            .remove(id)
            .with_context(|| format!("schedule not found: {}", id))?;
        Ok(())
    }
}

/// Keeps recommendations in their storage form, with pattern and schedule
/// held as JSON documents
#[derive(Default)]
pub struct InMemoryRecommendationStore {
    rows: DashMap<String, RecommendationRecord>,
}

impl InMemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw row, bypassing the typed conversion
    pub fn insert_record(&self, record: RecommendationRecord) {
        self.rows.insert(record.id.clone(), record);
    }

    fn decode(record: RecommendationRecord) -> Result<Recommendation> {
        let id = record.id.clone();
        Recommendation::try_from(record)
            .with_context(|| format!("decoding recommendation {}", id))
    }
}

#[async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn get_recommendation(&self, id: &str) -> Result<Option<Recommendation>> {
        self.rows
            .get(id)
            .map(|e| Self::decode(e.value().clone()))
            .transpose()
    }

    async fn list_recommendations(&self) -> Result<Vec<Recommendation>> {
        let mut recs = self
            .rows
            .iter()
            .map(|e| Self::decode(e.value().clone()))
            .collect::<Result<Vec<_>>>()?;
        recs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(recs)
    }

    async fn list_by_status(&self, status: RecommendationStatus) -> Result<Vec<Recommendation>> {
        let recs = self.list_recommendations().await?;
        Ok(recs.into_iter().filter(|r| r.status == status).collect())
    }

    async fn create_recommendation(&self, recommendation: Recommendation) -> Result<()> {
        let record = RecommendationRecord::try_from(&recommendation)?;
        self.rows.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_recommendation(&self, recommendation: Recommendation) -> Result<()> {
        if !self.rows.contains_key(&recommendation.id) {
            anyhow::bail!("recommendation not found: {}", recommendation.id);
        }
        let record = RecommendationRecord::try_from(&recommendation)?;
        self.rows.insert(record.id.clone(), record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOverrideStore {
    overrides: DashMap<String, Vec<Override>>,
}

impl InMemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, o: Override) {
        self.overrides
            .entry(o.instance_id.clone())
            .or_default()
            .push(o);
    }

    /// Mark every override past its `until` as expired, returning how many changed
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for mut entry in self.overrides.iter_mut() {
            for o in entry.value_mut().iter_mut() {
                if !o.expired && o.until.map(|until| until <= now).unwrap_or(false) {
                    o.expired = true;
                    expired += 1;
                }
            }
        }
        expired
    }
}

#[async_trait]
impl OverrideGate for InMemoryOverrideStore {
    async fn has_active_override(
        &self,
        instance_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .overrides
            .get(instance_id)
            .map(|list| list.iter().any(|o| o.suppresses(action.as_str(), now)))
            .unwrap_or(false))
    }
}
