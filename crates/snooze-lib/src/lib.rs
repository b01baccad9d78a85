//! Core library for the snooze database scheduler
//!
//! This crate provides:
//! - Instance selection with matchers and selectors
//! - Cron-driven start/stop scheduling with once-per-minute dedup
//! - Idle-window detection and schedule recommendations
//! - Provider connections, inventory sync and store interfaces
//! - Health checks and observability

pub mod analyzer;
pub mod error;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod provider;
pub mod scheduler;
pub mod selector;
pub mod store;

pub use error::{CronError, SelectorError, SnoozeError, SnoozeResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SnoozeMetrics, StructuredLogger};
