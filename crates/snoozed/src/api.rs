//! Daemon HTTP surface
//!
//! `GET /healthz` and `GET /readyz` serve the health registry,
//! `GET /metrics` the Prometheus scrape, and `POST /scheduler/run` runs one
//! scheduler pass on demand and answers with its tick report.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use snooze_lib::scheduler::{SchedulerLoop, TickReport};
use snooze_lib::{ComponentStatus, HealthRegistry};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub health: HealthRegistry,
    pub scheduler: Arc<SchedulerLoop>,
}

impl AppState {
    pub fn new(health: HealthRegistry, scheduler: Arc<SchedulerLoop>) -> Self {
        Self { health, scheduler }
    }
}

type SharedState = Arc<AppState>;

fn check_status(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Live unless some loop is unhealthy; degraded loops still run
async fn healthz(State(state): State<SharedState>) -> impl IntoResponse {
    let health = state.health.health().await;
    (
        check_status(health.status != ComponentStatus::Unhealthy),
        Json(health),
    )
}

async fn readyz(State(state): State<SharedState>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    (check_status(readiness.ready), Json(readiness))
}

async fn scrape() -> Response {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// 409 when another pass held the guard, so nothing was evaluated
fn pass_status(report: &TickReport) -> StatusCode {
    if report.skipped {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    }
}

async fn run_scheduler_pass(State(state): State<SharedState>) -> Response {
    match state.scheduler.run_once().await {
        Ok(report) => {
            info!(
                skipped = report.skipped,
                triggered = report.schedules_triggered,
                dispatched = report.actions_dispatched,
                failed = report.actions_failed,
                "On-demand scheduler pass finished"
            );
            (pass_status(&report), Json(report)).into_response()
        }
        Err(e) => {
            let message = format!("{:#}", e);
            warn!(error = %message, "On-demand scheduler pass failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response()
        }
    }
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(scrape))
        .route("/scheduler/run", post(run_scheduler_pass))
        .with_state(state)
}

pub async fn serve(port: u16, state: SharedState) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "API listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
