//! Observability infrastructure for the scheduler and analyzer
//!
//! Provides:
//! - Prometheus metrics (pass latency, dispatched/failed actions, recommendations)
//! - Structured JSON logging of domain events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for pass latency (in seconds). Passes block on provider
/// calls, so the range is wider than a pure CPU workload would need.
const PASS_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SnoozeMetricsInner> = OnceLock::new();

struct SnoozeMetricsInner {
    scheduler_pass_seconds: Histogram,
    scheduler_passes: IntCounterVec,
    schedules_triggered: IntCounterVec,
    actions_dispatched: IntCounterVec,
    actions_failed: IntCounterVec,
    instances_skipped: IntCounterVec,
    recommendations_generated: IntCounter,
    analysis_errors: IntCounter,
    instances_tracked: IntGauge,
    inventory_errors: IntCounter,
}

impl SnoozeMetricsInner {
    fn new() -> Self {
        Self {
            scheduler_pass_seconds: register_histogram!(
                "snooze_scheduler_pass_seconds",
                "Time spent evaluating all schedules in one scheduler pass",
                PASS_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scheduler_pass_seconds"),

            scheduler_passes: register_int_counter_vec!(
                "snooze_scheduler_passes_total",
                "Scheduler passes by outcome",
                &["outcome"]
            )
            .expect("Failed to register scheduler_passes_total"),

            schedules_triggered: register_int_counter_vec!(
                "snooze_schedules_triggered_total",
                "Schedule firings that passed deduplication",
                &["action"]
            )
            .expect("Failed to register schedules_triggered_total"),

            actions_dispatched: register_int_counter_vec!(
                "snooze_actions_dispatched_total",
                "Start/stop requests accepted by a provider",
                &["action"]
            )
            .expect("Failed to register actions_dispatched_total"),

            actions_failed: register_int_counter_vec!(
                "snooze_actions_failed_total",
                "Start/stop requests rejected by a provider",
                &["action"]
            )
            .expect("Failed to register actions_failed_total"),

            instances_skipped: register_int_counter_vec!(
                "snooze_instances_skipped_total",
                "Matching instances not acted on, by reason",
                &["reason"]
            )
            .expect("Failed to register instances_skipped_total"),

            recommendations_generated: register_int_counter!(
                "snooze_recommendations_generated_total",
                "Schedule recommendations created by the analyzer"
            )
            .expect("Failed to register recommendations_generated_total"),

            analysis_errors: register_int_counter!(
                "snooze_analysis_errors_total",
                "Instances whose activity analysis failed"
            )
            .expect("Failed to register analysis_errors_total"),

            instances_tracked: register_int_gauge!(
                "snooze_instances_tracked",
                "Database instances known from the last inventory sync"
            )
            .expect("Failed to register instances_tracked"),

            inventory_errors: register_int_counter!(
                "snooze_inventory_errors_total",
                "Provider listings or instance upserts that failed"
            )
            .expect("Failed to register inventory_errors_total"),
        }
    }
}

/// Handle to the global Prometheus metrics. Clones share the same metrics.
#[derive(Clone)]
pub struct SnoozeMetrics {
    _private: (),
}

impl Default for SnoozeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SnoozeMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SnoozeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SnoozeMetricsInner {
        GLOBAL_METRICS.get_or_init(SnoozeMetricsInner::new)
    }

    pub fn observe_pass_latency(&self, duration_secs: f64) {
        self.inner().scheduler_pass_seconds.observe(duration_secs);
    }

    /// `outcome` is "completed", "skipped" or "failed"
    pub fn inc_scheduler_pass(&self, outcome: &str) {
        self.inner()
            .scheduler_passes
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_schedule_triggered(&self, action: &str) {
        self.inner()
            .schedules_triggered
            .with_label_values(&[action])
            .inc();
    }

    pub fn inc_action_dispatched(&self, action: &str) {
        self.inner()
            .actions_dispatched
            .with_label_values(&[action])
            .inc();
    }

    pub fn inc_action_failed(&self, action: &str) {
        self.inner().actions_failed.with_label_values(&[action]).inc();
    }

    pub fn inc_instance_skipped(&self, reason: &str) {
        self.inner()
            .instances_skipped
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_recommendations_generated(&self, count: u64) {
        self.inner().recommendations_generated.inc_by(count);
    }

    pub fn inc_analysis_errors(&self) {
        self.inner().analysis_errors.inc();
    }

    pub fn set_instances_tracked(&self, count: i64) {
        self.inner().instances_tracked.set(count);
    }

    pub fn inc_inventory_errors(&self) {
        self.inner().inventory_errors.inc();
    }
}

/// Structured logger for scheduler and analyzer events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// A schedule's cron fired for the current minute
    pub fn log_schedule_triggered(&self, schedule_id: &str, schedule_name: &str, action: &str) {
        info!(
            event = "schedule_triggered",
            service = %self.service_name,
            schedule_id = %schedule_id,
            schedule_name = %schedule_name,
            action = %action,
            "Schedule triggered"
        );
    }

    pub fn log_action_dispatched(
        &self,
        schedule_id: &str,
        instance_id: &str,
        provider_name: &str,
        action: &str,
        dry_run: bool,
    ) {
        info!(
            event = "action_dispatched",
            service = %self.service_name,
            schedule_id = %schedule_id,
            instance_id = %instance_id,
            provider_name = %provider_name,
            action = %action,
            dry_run = dry_run,
            "Dispatched scheduled action"
        );
    }

    pub fn log_action_failed(
        &self,
        schedule_id: &str,
        instance_id: &str,
        provider_name: &str,
        action: &str,
        error: &str,
    ) {
        warn!(
            event = "action_failed",
            service = %self.service_name,
            schedule_id = %schedule_id,
            instance_id = %instance_id,
            provider_name = %provider_name,
            action = %action,
            error = %error,
            "Scheduled action failed"
        );
    }

    pub fn log_recommendation_created(
        &self,
        recommendation_id: &str,
        instance_id: &str,
        confidence_score: f64,
        estimated_daily_savings_cents: i64,
    ) {
        info!(
            event = "recommendation_created",
            service = %self.service_name,
            recommendation_id = %recommendation_id,
            instance_id = %instance_id,
            confidence_score = confidence_score,
            estimated_daily_savings_cents = estimated_daily_savings_cents,
            "Created schedule recommendation"
        );
    }

    pub fn log_startup(&self, version: &str, schedules: usize, providers: usize) {
        info!(
            event = "daemon_started",
            service = %self.service_name,
            version = %version,
            schedules = schedules,
            providers = providers,
            "Snooze daemon started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "daemon_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Snooze daemon shutting down"
        );
    }
}
