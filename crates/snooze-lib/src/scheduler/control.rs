//! Scheduler control loop
//!
//! Every tick evaluates all enabled schedules, resolves the instances their
//! selectors match and dispatches start/stop calls. Passes never overlap:
//! a pass that finds another one in flight returns immediately.

use super::{Action, ScheduleEvaluator};
use crate::health::{components, HealthRegistry};
use crate::models::{EventType, Instance, Schedule, TriggeredBy};
use crate::observability::{SnoozeMetrics, StructuredLogger};
use crate::provider::ProviderRegistry;
use crate::selector::CompiledSelector;
use crate::store::{EventStore, InstanceStore, NewEvent, NoOverrides, OverrideGate, ScheduleStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the scheduler loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between passes (default: 60 seconds)
    pub tick_interval: Duration,
    /// Log what would be dispatched without calling providers
    pub dry_run: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            dry_run: false,
        }
    }
}

/// Outcome of one scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Another pass was in flight, nothing was evaluated
    pub skipped: bool,
    /// Shutdown interrupted the pass before every instance was handled
    pub cancelled: bool,
    pub schedules_evaluated: usize,
    pub schedules_triggered: usize,
    pub actions_dispatched: usize,
    pub actions_failed: usize,
    pub instances_skipped: usize,
}

impl TickReport {
    fn started(now: DateTime<Utc>) -> Self {
        Self {
            evaluated_at: Some(now),
            ..Default::default()
        }
    }

    fn in_flight(now: DateTime<Utc>) -> Self {
        Self {
            skipped: true,
            ..Self::started(now)
        }
    }
}

/// Why a matching instance was left alone
#[derive(Debug, Clone, Copy)]
enum SkipReason {
    TargetState,
    Override,
    OverrideCheckFailed,
    DryRun,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TargetState => "target_state",
            SkipReason::Override => "override",
            SkipReason::OverrideCheckFailed => "override_check_failed",
            SkipReason::DryRun => "dry_run",
        }
    }
}

/// Periodic start/stop loop over all schedules
pub struct SchedulerLoop {
    schedules: Arc<dyn ScheduleStore>,
    instances: Arc<dyn InstanceStore>,
    events: Arc<dyn EventStore>,
    overrides: Arc<dyn OverrideGate>,
    providers: Arc<ProviderRegistry>,
    evaluator: ScheduleEvaluator,
    config: SchedulerConfig,
    metrics: SnoozeMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    /// Held for the duration of a pass
    pass_guard: Mutex<()>,
    cancelled: AtomicBool,
}

impl SchedulerLoop {
    pub fn builder() -> SchedulerLoopBuilder {
        SchedulerLoopBuilder::new()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &ScheduleEvaluator {
        &self.evaluator
    }

    /// Run until `shutdown` fires. The first pass starts immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            dry_run = self.config.dry_run,
            "Starting scheduler loop"
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pass = self.run_once();
                    tokio::pin!(pass);

                    tokio::select! {
                        outcome = &mut pass => self.record_pass(outcome).await,
                        _ = shutdown.recv() => {
                            info!("Shutdown requested, finishing in-flight scheduler pass");
                            self.cancel();
                            let outcome = pass.await;
                            self.record_pass(outcome).await;
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        info!("Scheduler loop stopped");
    }

    /// Stop dispatching. The current provider call completes; no further
    /// instances are processed by this or any later pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Evaluate every schedule against the current time
    pub async fn run_once(&self) -> Result<TickReport> {
        self.run_at(Utc::now()).await
    }

    /// Evaluate every schedule as of `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let Ok(_pass) = self.pass_guard.try_lock() else {
            debug!("Scheduler pass already in flight, skipping");
            self.metrics.inc_scheduler_pass("skipped");
            return Ok(TickReport::in_flight(now));
        };

        let started = Instant::now();
        let mut report = TickReport::started(now);

        let schedules = match self.schedules.list_schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                self.metrics.inc_scheduler_pass("failed");
                return Err(e.context("listing schedules"));
            }
        };

        let ids: Vec<&str> = schedules.iter().map(|s| s.id.as_str()).collect();
        self.evaluator.retain_schedules(&ids);

        for schedule in schedules.iter().filter(|s| s.enabled) {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.schedules_evaluated += 1;
            self.evaluate_schedule(schedule, now, &mut report).await;
        }

        let elapsed = started.elapsed();
        self.metrics.observe_pass_latency(elapsed.as_secs_f64());
        self.metrics.inc_scheduler_pass("completed");

        debug!(
            schedules = report.schedules_evaluated,
            triggered = report.schedules_triggered,
            dispatched = report.actions_dispatched,
            failed = report.actions_failed,
            skipped = report.instances_skipped,
            elapsed_ms = elapsed.as_millis(),
            "Scheduler pass complete"
        );

        Ok(report)
    }

    async fn evaluate_schedule(&self, schedule: &Schedule, now: DateTime<Utc>, report: &mut TickReport) {
        let action = self.evaluator.determine_action(schedule, now);
        if action == Action::None {
            return;
        }
        if !self.evaluator.should_execute(&schedule.id, action, now) {
            debug!(
                schedule_id = %schedule.id,
                action = %action,
                "Schedule already fired this minute"
            );
            return;
        }

        report.schedules_triggered += 1;
        self.metrics.inc_schedule_triggered(action.as_str());
        self.logger
            .log_schedule_triggered(&schedule.id, &schedule.name, action.as_str());

        let instances = match self.instances.list_instances().await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(
                    schedule_id = %schedule.id,
                    error = %e,
                    "Failed to list instances, skipping schedule"
                );
                return;
            }
        };

        let selectors = CompiledSelector::compile_all(&schedule.selectors);
        for instance in instances
            .iter()
            .filter(|i| CompiledSelector::any_match(&selectors, i))
        {
            if self.is_cancelled() {
                report.cancelled = true;
                return;
            }
            self.apply(schedule, instance, action, now, report).await;
        }
    }

    async fn apply(
        &self,
        schedule: &Schedule,
        instance: &Instance,
        action: Action,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        if let Some(reason) = self.skip_reason(instance, action, now).await {
            debug!(
                schedule_id = %schedule.id,
                instance_id = %instance.id,
                action = %action,
                reason = reason.as_str(),
                "Skipping instance"
            );
            if let SkipReason::DryRun = reason {
                self.logger.log_action_dispatched(
                    &schedule.id,
                    &instance.id,
                    &instance.provider_name,
                    action.as_str(),
                    true,
                );
            }
            report.instances_skipped += 1;
            self.metrics.inc_instance_skipped(reason.as_str());
            return;
        }

        let (event_type, new_status) = match action {
            Action::Start => (EventType::Wake, "starting"),
            _ => (EventType::Sleep, "stopping"),
        };

        let event_id = match self
            .events
            .create_event(NewEvent {
                instance_id: instance.id.clone(),
                event_type,
                triggered_by: TriggeredBy::Schedule,
                previous_status: instance.status.clone(),
                new_status: new_status.to_string(),
                metadata: serde_json::json!({
                    "schedule_id": schedule.id,
                    "schedule_name": schedule.name,
                }),
            })
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    instance_id = %instance.id,
                    error = %e,
                    "Failed to record event"
                );
                None
            }
        };

        let result = match action {
            Action::Start => {
                self.providers
                    .start_database(&instance.provider_name, &instance.provider_id)
                    .await
            }
            _ => {
                self.providers
                    .stop_database(&instance.provider_name, &instance.provider_id)
                    .await
            }
        };

        match result {
            Ok(()) => {
                report.actions_dispatched += 1;
                self.metrics.inc_action_dispatched(action.as_str());
                self.logger.log_action_dispatched(
                    &schedule.id,
                    &instance.id,
                    &instance.provider_name,
                    action.as_str(),
                    false,
                );
            }
            Err(e) => {
                report.actions_failed += 1;
                self.metrics.inc_action_failed(action.as_str());
                self.logger.log_action_failed(
                    &schedule.id,
                    &instance.id,
                    &instance.provider_name,
                    action.as_str(),
                    &format!("{:#}", e),
                );

                if let Some(event_id) = event_id {
                    let annotated = self
                        .events
                        .annotate_event(&event_id, serde_json::json!({ "error": format!("{:#}", e) }))
                        .await;
                    if let Err(e) = annotated {
                        warn!(event_id = %event_id, error = %e, "Failed to annotate event");
                    }
                }
            }
        }
    }

    async fn skip_reason(&self, instance: &Instance, action: Action, now: DateTime<Utc>) -> Option<SkipReason> {
        let in_target_state = match action {
            Action::Start => instance.is_awake(),
            Action::Stop => instance.is_asleep(),
            Action::None => true,
        };
        if in_target_state {
            return Some(SkipReason::TargetState);
        }

        match self.overrides.has_active_override(&instance.id, action, now).await {
            Ok(true) => return Some(SkipReason::Override),
            Ok(false) => {}
            Err(e) => {
                warn!(
                    instance_id = %instance.id,
                    action = %action,
                    error = %e,
                    "Override check failed, skipping instance"
                );
                return Some(SkipReason::OverrideCheckFailed);
            }
        }

        self.config.dry_run.then_some(SkipReason::DryRun)
    }

    async fn record_pass(&self, outcome: Result<TickReport>) {
        if let Err(e) = &outcome {
            warn!(error = %format!("{:#}", e), "Scheduler pass failed");
        }
        if let Some(health) = &self.health {
            health.report(components::SCHEDULER, &outcome).await;
        }
    }
}

/// Builder for [`SchedulerLoop`]
pub struct SchedulerLoopBuilder {
    schedules: Option<Arc<dyn ScheduleStore>>,
    instances: Option<Arc<dyn InstanceStore>>,
    events: Option<Arc<dyn EventStore>>,
    overrides: Arc<dyn OverrideGate>,
    providers: Option<Arc<ProviderRegistry>>,
    evaluator: Option<ScheduleEvaluator>,
    config: SchedulerConfig,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl Default for SchedulerLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerLoopBuilder {
    pub fn new() -> Self {
        Self {
            schedules: None,
            instances: None,
            events: None,
            overrides: Arc::new(NoOverrides),
            providers: None,
            evaluator: None,
            config: SchedulerConfig::default(),
            logger: None,
            health: None,
        }
    }

    pub fn schedules(mut self, store: Arc<dyn ScheduleStore>) -> Self {
        self.schedules = Some(store);
        self
    }

    pub fn instances(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.instances = Some(store);
        self
    }

    pub fn events(mut self, store: Arc<dyn EventStore>) -> Self {
        self.events = Some(store);
        self
    }

    pub fn overrides(mut self, gate: Arc<dyn OverrideGate>) -> Self {
        self.overrides = gate;
        self
    }

    pub fn providers(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.providers = Some(registry);
        self
    }

    /// Use `evaluator` and the dedup state it carries instead of a fresh one
    pub fn evaluator(mut self, evaluator: ScheduleEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<SchedulerLoop> {
        Ok(SchedulerLoop {
            schedules: self.schedules.context("schedule store is required")?,
            instances: self.instances.context("instance store is required")?,
            events: self.events.context("event store is required")?,
            overrides: self.overrides,
            providers: self.providers.context("provider registry is required")?,
            evaluator: self.evaluator.unwrap_or_default(),
            config: self.config,
            metrics: SnoozeMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("scheduler")),
            health: self.health,
            pass_guard: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        })
    }
}
