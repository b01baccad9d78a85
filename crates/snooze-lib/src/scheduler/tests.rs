//! Scheduler tests
//!
//! These tests verify:
//! - Cron evaluation in schedule-local time with the one-minute look-back
//! - Once-per-minute deduplication
//! - The control loop's skip rules, audit events and failure handling
//! - Non-overlapping passes and cancellation

use super::*;
use crate::error::SnoozeError;
use crate::models::{EventType, Instance, Matcher, Override, Schedule, Selector, TriggeredBy};
use crate::provider::{Provider, ProviderRegistry};
use crate::selector::tests::create_test_instance;
use crate::store::{InMemoryEventStore, InMemoryInstanceStore, InMemoryOverrideStore, InMemoryScheduleStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const PROVIDER_NAME: &str = "aws_123456789012_us-east-1";

/// Monday 2024-01-01 at the given UTC time
fn monday_at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, second).unwrap()
}

/// Helper to create a test schedule selecting instances tagged `Environment=dev`
fn create_test_schedule(id: &str, sleep_cron: &str, wake_cron: &str) -> Schedule {
    let mut tags = HashMap::new();
    tags.insert("Environment".to_string(), Matcher::exact("dev"));

    Schedule {
        id: id.to_string(),
        name: format!("{}-schedule", id),
        description: String::new(),
        selectors: vec![Selector {
            tags,
            ..Default::default()
        }],
        timezone: "UTC".to_string(),
        sleep_cron: sleep_cron.to_string(),
        wake_cron: wake_cron.to_string(),
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn dev_instance(name: &str, status: &str) -> Instance {
    let mut instance = create_test_instance(name, "aws", &[("Environment", "dev")]);
    instance.status = status.to_string();
    instance
}

/// Provider that records calls and how many events existed at call time
struct RecordingProvider {
    events: Arc<InMemoryEventStore>,
    calls: Mutex<Vec<(String, String)>>,
    events_at_call: Mutex<Vec<usize>>,
    failing: Vec<String>,
}

impl RecordingProvider {
    fn new(events: Arc<InMemoryEventStore>, failing: &[&str]) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            events_at_call: Mutex::new(Vec::new()),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, action: &str, provider_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), provider_id.to_string()));
        self.events_at_call
            .lock()
            .unwrap()
            .push(self.events.events().len());

        if self.failing.iter().any(|id| id == provider_id) {
            anyhow::bail!("InvalidDBInstanceState: {}", provider_id);
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    async fn list_databases(&self) -> Result<Vec<Instance>> {
        Ok(Vec::new())
    }

    async fn start_database(&self, provider_id: &str) -> Result<()> {
        self.record("start", provider_id)
    }

    async fn stop_database(&self, provider_id: &str) -> Result<()> {
        self.record("stop", provider_id)
    }

    async fn get_database_status(&self, _provider_id: &str) -> Result<String> {
        Ok("available".to_string())
    }
}

/// Provider whose stop call blocks until released
struct GatedProvider {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Provider for GatedProvider {
    async fn list_databases(&self) -> Result<Vec<Instance>> {
        Ok(Vec::new())
    }

    async fn start_database(&self, _provider_id: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_database(&self, _provider_id: &str) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn get_database_status(&self, _provider_id: &str) -> Result<String> {
        Ok("stopping".to_string())
    }
}

struct Harness {
    scheduler: SchedulerLoop,
    events: Arc<InMemoryEventStore>,
    overrides: Arc<InMemoryOverrideStore>,
    provider: Arc<RecordingProvider>,
}

fn create_test_harness(schedules: Vec<Schedule>, instances: Vec<Instance>, failing: &[&str]) -> Harness {
    create_harness_with(schedules, instances, failing, false)
}

fn create_harness_with(
    schedules: Vec<Schedule>,
    instances: Vec<Instance>,
    failing: &[&str],
    dry_run: bool,
) -> Harness {
    let events = Arc::new(InMemoryEventStore::new());
    let overrides = Arc::new(InMemoryOverrideStore::new());
    let provider = Arc::new(RecordingProvider::new(events.clone(), failing));
    let registry = Arc::new(ProviderRegistry::new());
    registry.register(PROVIDER_NAME, provider.clone());

    let scheduler = SchedulerLoop::builder()
        .schedules(Arc::new(InMemoryScheduleStore::with_schedules(schedules)))
        .instances(Arc::new(InMemoryInstanceStore::with_instances(instances)))
        .events(events.clone())
        .overrides(overrides.clone())
        .providers(registry)
        .dry_run(dry_run)
        .build()
        .unwrap();

    Harness {
        scheduler,
        events,
        overrides,
        provider,
    }
}

mod evaluator_tests {
    use super::*;

    #[test]
    fn test_should_execute_once_per_minute() {
        let evaluator = ScheduleEvaluator::new();
        let t = monday_at(19, 0, 5);

        assert!(evaluator.should_execute("s-1", Action::Stop, t));
        assert!(!evaluator.should_execute("s-1", Action::Stop, t + Duration::seconds(40)));
        assert!(evaluator.should_execute("s-1", Action::Stop, t + Duration::minutes(1)));
    }

    #[test]
    fn test_dedup_is_per_schedule_and_action() {
        let evaluator = ScheduleEvaluator::new();
        let t = monday_at(19, 0, 5);

        assert!(evaluator.should_execute("s-1", Action::Stop, t));
        assert!(evaluator.should_execute("s-1", Action::Start, t));
        assert!(evaluator.should_execute("s-2", Action::Stop, t));
        assert!(!evaluator.should_execute("s-2", Action::Stop, t));
    }

    #[test]
    fn test_separate_evaluators_do_not_share_state() {
        let first = ScheduleEvaluator::new();
        let second = ScheduleEvaluator::new();
        let t = monday_at(19, 0, 5);

        assert!(first.should_execute("s-1", Action::Stop, t));
        assert!(second.should_execute("s-1", Action::Stop, t));
    }

    #[test]
    fn test_retain_drops_deleted_schedules() {
        let evaluator = ScheduleEvaluator::new();
        let t = monday_at(19, 0, 5);
        evaluator.should_execute("keep", Action::Stop, t);
        evaluator.should_execute("gone", Action::Start, t);

        evaluator.retain_schedules(&["keep"]);
        assert_eq!(evaluator.tracked_keys(), 1);
        assert!(evaluator.should_execute("gone", Action::Start, t));
    }

    #[test]
    fn test_sleep_fires_within_its_minute_only() {
        let evaluator = ScheduleEvaluator::new();
        let schedule = create_test_schedule("s-1", "0 19 * * 1-5", "");

        assert_eq!(evaluator.determine_action(&schedule, monday_at(19, 0, 30)), Action::Stop);
        assert_eq!(evaluator.determine_action(&schedule, monday_at(19, 0, 0)), Action::Stop);
        assert_eq!(evaluator.determine_action(&schedule, monday_at(19, 1, 30)), Action::None);
        assert_eq!(evaluator.determine_action(&schedule, monday_at(18, 59, 59)), Action::None);
    }

    #[test]
    fn test_weekday_schedule_ignores_weekend() {
        let evaluator = ScheduleEvaluator::new();
        let schedule = create_test_schedule("s-1", "0 19 * * 1-5", "");
        // 2024-01-06 is a Saturday
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 19, 0, 30).unwrap();

        assert_eq!(evaluator.determine_action(&schedule, saturday), Action::None);
    }

    #[test]
    fn test_wake_checked_before_sleep() {
        let evaluator = ScheduleEvaluator::new();
        let schedule = create_test_schedule("s-1", "0 7 * * *", "0 7 * * *");

        assert_eq!(evaluator.determine_action(&schedule, monday_at(7, 0, 10)), Action::Start);
    }

    #[test]
    fn test_evaluates_in_schedule_timezone() {
        let evaluator = ScheduleEvaluator::new();
        let mut schedule = create_test_schedule("s-1", "0 19 * * 1-5", "0 7 * * 1-5");
        schedule.timezone = "America/New_York".to_string();

        // Monday 19:00:30 in New York is Tuesday 00:00:30 UTC
        let ny_evening = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 30).unwrap();
        assert_eq!(evaluator.determine_action(&schedule, ny_evening), Action::Stop);
        assert_eq!(evaluator.determine_action(&schedule, monday_at(19, 0, 30)), Action::None);

        // Monday 07:00 in New York is 12:00 UTC
        assert_eq!(evaluator.determine_action(&schedule, monday_at(12, 0, 30)), Action::Start);
    }

    /// Local (date, hour, minute) of every minute from `start` on where the
    /// schedule calls for `action`, checked 30 seconds into each minute
    fn local_fires(
        schedule: &Schedule,
        start: DateTime<Utc>,
        days: i64,
        action: Action,
    ) -> Vec<(String, u32, u32)> {
        let evaluator = ScheduleEvaluator::new();
        let tz = resolve_timezone(&schedule.timezone);
        (0..days * 24 * 60)
            .map(|m| start + Duration::minutes(m) + Duration::seconds(30))
            .filter(|now| evaluator.determine_action(schedule, *now) == action)
            .map(|now| {
                let local = now.with_timezone(&tz);
                (local.date_naive().to_string(), local.hour(), local.minute())
            })
            .collect()
    }

    #[test]
    fn test_spring_forward_day_still_fires() {
        let mut schedule = create_test_schedule("s-1", "30 2 * * *", "");
        schedule.timezone = "America/New_York".to_string();

        let start = Utc.with_ymd_and_hms(2024, 3, 8, 5, 0, 0).unwrap();
        let fires = local_fires(&schedule, start, 4, Action::Stop);
        assert_eq!(
            fires,
            vec![
                ("2024-03-08".to_string(), 2, 30),
                ("2024-03-09".to_string(), 2, 30),
                ("2024-03-10".to_string(), 3, 0),
                ("2024-03-11".to_string(), 2, 30),
            ]
        );
    }

    #[test]
    fn test_fall_back_day_fires_once() {
        let mut schedule = create_test_schedule("s-1", "", "30 1 * * *");
        schedule.timezone = "America/New_York".to_string();

        let start = Utc.with_ymd_and_hms(2024, 11, 1, 4, 0, 0).unwrap();
        let fires = local_fires(&schedule, start, 4, Action::Start);
        assert_eq!(
            fires,
            vec![
                ("2024-11-01".to_string(), 1, 30),
                ("2024-11-02".to_string(), 1, 30),
                ("2024-11-03".to_string(), 1, 30),
                ("2024-11-04".to_string(), 1, 30),
            ]
        );

        // The 01:30 that fires on 11-03 is the EDT one
        let evaluator = ScheduleEvaluator::new();
        let edt = Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 30).unwrap();
        let est = Utc.with_ymd_and_hms(2024, 11, 3, 6, 30, 30).unwrap();
        assert_eq!(evaluator.determine_action(&schedule, edt), Action::Start);
        assert_eq!(evaluator.determine_action(&schedule, est), Action::None);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let evaluator = ScheduleEvaluator::new();
        let mut schedule = create_test_schedule("s-1", "0 19 * * 1-5", "");
        schedule.timezone = "Mars/Olympus_Mons".to_string();

        assert_eq!(resolve_timezone("Mars/Olympus_Mons"), chrono_tz::Tz::UTC);
        assert_eq!(resolve_timezone(""), chrono_tz::Tz::UTC);
        assert_eq!(evaluator.determine_action(&schedule, monday_at(19, 0, 30)), Action::Stop);
    }

    #[test]
    fn test_invalid_cron_never_fires() {
        let evaluator = ScheduleEvaluator::new();
        let schedule = create_test_schedule("s-1", "not a cron", "0 7 * * 9");

        for minute in 0..60 {
            assert_eq!(
                evaluator.determine_action(&schedule, monday_at(7, minute, 0)),
                Action::None
            );
        }
    }

    #[test]
    fn test_schedule_validation() {
        let valid = create_test_schedule("s-1", "0 19 * * 1-5", "0 7 * * 1-5");
        assert!(valid.validate().is_ok());

        let mut unnamed = valid.clone();
        unnamed.name = " ".to_string();
        assert!(matches!(unnamed.validate(), Err(SnoozeError::InvalidSchedule(_))));

        let mut no_crons = valid.clone();
        no_crons.sleep_cron.clear();
        no_crons.wake_cron.clear();
        assert!(matches!(no_crons.validate(), Err(SnoozeError::InvalidSchedule(_))));

        let mut bad_tz = valid.clone();
        bad_tz.timezone = "Europe/Atlantis".to_string();
        assert!(matches!(bad_tz.validate(), Err(SnoozeError::InvalidTimezone(_))));

        let mut bad_cron = valid.clone();
        bad_cron.sleep_cron = "0 19 * *".to_string();
        assert!(matches!(bad_cron.validate(), Err(SnoozeError::Cron(_))));

        let mut bad_regex = valid;
        bad_regex.selectors = vec![Selector {
            name: Some(Matcher::regex("([")),
            ..Default::default()
        }];
        assert!(matches!(bad_regex.validate(), Err(SnoozeError::Selector(_))));
    }
}

mod control_loop_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_dispatched_after_event() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "0 7 * * 1-5")],
            vec![dev_instance("orders", "available")],
            &[],
        );

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.schedules_evaluated, 1);
        assert_eq!(report.schedules_triggered, 1);
        assert_eq!(report.actions_dispatched, 1);
        assert_eq!(h.provider.calls(), vec![("stop".to_string(), "orders".to_string())]);

        // The audit event existed before the provider was called
        assert_eq!(*h.provider.events_at_call.lock().unwrap(), vec![1]);

        let events = h.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Sleep);
        assert_eq!(events[0].triggered_by, TriggeredBy::Schedule);
        assert_eq!(events[0].previous_status, "available");
        assert_eq!(events[0].new_status, "stopping");
        assert_eq!(events[0].metadata["schedule_id"], "s-1");
    }

    #[tokio::test]
    async fn test_start_emits_wake_event() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "0 7 * * 1-5")],
            vec![dev_instance("orders", "stopped")],
            &[],
        );

        let report = h.scheduler.run_at(monday_at(7, 0, 45)).await.unwrap();
        assert_eq!(report.actions_dispatched, 1);
        assert_eq!(h.provider.calls()[0].0, "start");

        let events = h.events.events();
        assert_eq!(events[0].event_type, EventType::Wake);
        assert_eq!(events[0].new_status, "starting");
    }

    #[tokio::test]
    async fn test_second_pass_in_same_minute_is_deduplicated() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![dev_instance("orders", "available")],
            &[],
        );

        h.scheduler.run_at(monday_at(19, 0, 5)).await.unwrap();
        let again = h.scheduler.run_at(monday_at(19, 0, 50)).await.unwrap();

        assert_eq!(again.schedules_triggered, 0);
        assert_eq!(again.actions_dispatched, 0);
        assert_eq!(h.provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_evaluator_keeps_dedup_state() {
        let evaluator = ScheduleEvaluator::new();
        assert!(evaluator.should_execute("s-1", Action::Stop, monday_at(19, 0, 1)));

        let events = Arc::new(InMemoryEventStore::new());
        let provider = Arc::new(RecordingProvider::new(events.clone(), &[]));
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(PROVIDER_NAME, provider.clone());

        let scheduler = SchedulerLoop::builder()
            .schedules(Arc::new(InMemoryScheduleStore::with_schedules(vec![
                create_test_schedule("s-1", "0 19 * * 1-5", ""),
            ])))
            .instances(Arc::new(InMemoryInstanceStore::with_instances(vec![
                dev_instance("orders", "available"),
            ])))
            .events(events)
            .providers(registry)
            .evaluator(evaluator)
            .build()
            .unwrap();

        let report = scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.schedules_triggered, 0);
        assert!(provider.calls().is_empty());
        assert_eq!(scheduler.evaluator().tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_instances_in_target_state_skipped() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![
                dev_instance("already-stopped", "stopped"),
                dev_instance("going-down", "stopping"),
                dev_instance("running", "available"),
            ],
            &[],
        );

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.instances_skipped, 2);
        assert_eq!(report.actions_dispatched, 1);
        assert_eq!(h.provider.calls(), vec![("stop".to_string(), "running".to_string())]);
        assert_eq!(h.events.events().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_instances_untouched() {
        let prod = create_test_instance("billing", "aws", &[("Environment", "prod")]);
        let untagged = create_test_instance("scratch", "aws", &[]);
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![prod, untagged],
            &[],
        );

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.schedules_triggered, 1);
        assert_eq!(report.actions_dispatched, 0);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_active_override_skips_instance() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![dev_instance("orders", "available"), dev_instance("users", "available")],
            &[],
        );
        h.overrides.add(Override {
            id: "o-1".to_string(),
            instance_id: "id-orders".to_string(),
            skip_action: Some("stop".to_string()),
            until: Some(monday_at(23, 0, 0)),
            reason: Some("release testing".to_string()),
            created_by: "ops".to_string(),
            expired: false,
        });

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.instances_skipped, 1);
        assert_eq!(h.provider.calls(), vec![("stop".to_string(), "users".to_string())]);
    }

    #[tokio::test]
    async fn test_provider_failure_annotated_and_pass_continues() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![dev_instance("broken", "available"), dev_instance("orders", "available")],
            &["broken"],
        );

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.actions_failed, 1);
        assert_eq!(report.actions_dispatched, 1);
        assert_eq!(h.provider.calls().len(), 2);

        let failed = h
            .events
            .events()
            .into_iter()
            .find(|e| e.instance_id == "id-broken")
            .unwrap();
        let error = failed.metadata["error"].as_str().unwrap();
        assert!(error.contains("InvalidDBInstanceState"));
        assert_eq!(failed.metadata["schedule_id"], "s-1");
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_a_failed_action() {
        let mut stray = dev_instance("stray", "available");
        stray.provider_name = "gcp_other-project".to_string();
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![stray],
            &[],
        );

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.actions_failed, 1);

        let event = &h.events.events()[0];
        assert!(event.metadata["error"]
            .as_str()
            .unwrap()
            .contains("gcp_other-project"));
    }

    #[tokio::test]
    async fn test_disabled_schedule_not_evaluated() {
        let mut schedule = create_test_schedule("s-1", "0 19 * * 1-5", "");
        schedule.enabled = false;
        let h = create_test_harness(vec![schedule], vec![dev_instance("orders", "available")], &[]);

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.schedules_evaluated, 0);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_records_nothing() {
        let h = create_harness_with(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![dev_instance("orders", "available")],
            &[],
            true,
        );

        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert_eq!(report.schedules_triggered, 1);
        assert_eq!(report.instances_skipped, 1);
        assert!(h.provider.calls().is_empty());
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_loop_dispatches_nothing() {
        let h = create_test_harness(
            vec![create_test_schedule("s-1", "0 19 * * 1-5", "")],
            vec![dev_instance("orders", "available")],
            &[],
        );

        h.scheduler.cancel();
        let report = h.scheduler.run_at(monday_at(19, 0, 30)).await.unwrap();
        assert!(report.cancelled);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(
            PROVIDER_NAME,
            Arc::new(GatedProvider {
                entered: entered.clone(),
                release: release.clone(),
            }),
        );

        let scheduler = Arc::new(
            SchedulerLoop::builder()
                .schedules(Arc::new(InMemoryScheduleStore::with_schedules(vec![
                    create_test_schedule("s-1", "0 19 * * 1-5", ""),
                ])))
                .instances(Arc::new(InMemoryInstanceStore::with_instances(vec![
                    dev_instance("orders", "available"),
                ])))
                .events(Arc::new(InMemoryEventStore::new()))
                .providers(registry)
                .build()
                .unwrap(),
        );

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_at(monday_at(19, 0, 5)).await })
        };
        entered.notified().await;

        let overlapping = scheduler.run_at(monday_at(19, 0, 10)).await.unwrap();
        assert!(overlapping.skipped);
        assert_eq!(overlapping.schedules_evaluated, 0);

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(!first.skipped);
        assert_eq!(first.actions_dispatched, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = create_test_harness(Vec::new(), Vec::new(), &[]);
        let scheduler = Arc::new(h.scheduler);
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

        let handle = tokio::spawn(scheduler.clone().run(shutdown_rx));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("scheduler loop did not stop")
            .unwrap();
    }

    #[test]
    fn test_builder_requires_stores() {
        assert!(SchedulerLoop::builder().build().is_err());
    }
}
