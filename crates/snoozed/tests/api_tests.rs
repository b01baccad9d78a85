//! Integration tests for the daemon's HTTP surface

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use snooze_lib::health::{components, HealthRegistry};
use snooze_lib::models::{Instance, Schedule};
use snooze_lib::provider::{Provider, ProviderRegistry};
use snooze_lib::scheduler::SchedulerLoop;
use snooze_lib::store::{InMemoryEventStore, InMemoryInstanceStore, InMemoryScheduleStore};
use snooze_lib::SnoozeMetrics;
use snoozed::api::{create_router, AppState};
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

const CONNECTION: &str = "aws_123456789012_us-east-1";

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

/// A schedule that stops `Environment=dev` instances every minute
fn every_minute_schedule() -> Schedule {
    serde_json::from_value(serde_json::json!({
        "id": "s-1",
        "name": "always-asleep",
        "timezone": "UTC",
        "sleep_cron": "* * * * *",
        "enabled": true,
        "selectors": [{"tags": {"Environment": {"pattern": "dev", "type": "exact"}}}]
    }))
    .unwrap()
}

fn dev_instance() -> Instance {
    serde_json::from_value(serde_json::json!({
        "id": "orders",
        "provider_id": "orders",
        "provider": "aws",
        "provider_name": CONNECTION,
        "name": "orders-dev",
        "region": "us-east-1",
        "engine": "postgres",
        "status": "available",
        "tags": {"Environment": "dev"},
        "managed": true
    }))
    .unwrap()
}

fn scheduler_with(provider: Arc<dyn Provider>, schedules: Vec<Schedule>) -> Arc<SchedulerLoop> {
    let registry = Arc::new(ProviderRegistry::new());
    registry.register(CONNECTION, provider);

    Arc::new(
        SchedulerLoop::builder()
            .schedules(Arc::new(InMemoryScheduleStore::with_schedules(schedules)))
            .instances(Arc::new(InMemoryInstanceStore::with_instances(vec![
                dev_instance(),
            ])))
            .events(Arc::new(InMemoryEventStore::new()))
            .providers(registry)
            .build()
            .unwrap(),
    )
}

async fn app_with_scheduler(scheduler: Arc<SchedulerLoop>) -> (Router, Arc<AppState>) {
    let health = HealthRegistry::with_default_components().await;
    let state = Arc::new(AppState::new(health, scheduler));
    (create_router(state.clone()), state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let idle = Arc::new(GatedProvider {
        entered: Arc::new(Notify::new()),
        release: Arc::new(Notify::new()),
    });
    app_with_scheduler(scheduler_with(idle, Vec::new())).await
}

async fn request(app: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    request(app, Method::GET, uri).await
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health
        .pass_failed(components::PROVIDERS, "listing failed for gcp_analytics")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health
        .set_unhealthy(components::SCHEDULER, "schedule store unreachable")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let (_, body) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    for name in components::ALL {
        assert!(health["components"][name].is_object(), "missing {}", name);
    }
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health.set_ready(true).await;
    state
        .health
        .set_unhealthy(components::INVENTORY, "Failed")
        .await;

    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    let metrics = SnoozeMetrics::new();
    metrics.observe_pass_latency(0.004);
    metrics.inc_action_dispatched("stop");
    metrics.inc_instance_skipped("override");
    metrics.set_instances_tracked(3);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("snooze_scheduler_pass_seconds"));
    assert!(metrics_text.contains("snooze_actions_dispatched_total"));
    assert!(metrics_text.contains("snooze_instances_skipped_total"));
    assert!(metrics_text.contains("snooze_instances_tracked"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, _state) = setup_test_app().await;

    let metrics = SnoozeMetrics::new();
    metrics.observe_pass_latency(0.001);
    metrics.observe_pass_latency(0.05);

    let (_, body) = get(app, "/metrics").await;
    let metrics_text = String::from_utf8(body).unwrap();

    assert!(metrics_text.contains("snooze_scheduler_pass_seconds_bucket"));
    assert!(metrics_text.contains("snooze_scheduler_pass_seconds_count"));
    assert!(metrics_text.contains("snooze_scheduler_pass_seconds_sum"));
}

#[tokio::test]
async fn test_scheduler_run_with_no_schedules() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = request(app, Method::POST, "/scheduler/run").await;
    assert_eq!(status, StatusCode::OK);

    let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["skipped"], false);
    assert_eq!(report["schedules_evaluated"], 0);
    assert!(report["evaluated_at"].is_string());
}

#[tokio::test]
async fn test_scheduler_run_requires_post() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = get(app, "/scheduler/run").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_concurrent_scheduler_runs_dispatch_once() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let provider = Arc::new(GatedProvider {
        entered: entered.clone(),
        release: release.clone(),
    });
    let (app, _state) =
        app_with_scheduler(scheduler_with(provider, vec![every_minute_schedule()])).await;

    let first = tokio::spawn(request(app.clone(), Method::POST, "/scheduler/run"));
    entered.notified().await;

    let (status, body) = request(app, Method::POST, "/scheduler/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let overlapping: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(overlapping["skipped"], true);
    assert_eq!(overlapping["actions_dispatched"], 0);

    release.notify_one();
    let (status, body) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["skipped"], false);
    assert_eq!(report["schedules_triggered"], 1);
    assert_eq!(report["actions_dispatched"], 1);
}
