//! Error types for the scheduling and analysis core

use thiserror::Error;

/// A selector that failed validation
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("invalid regex in selector {index} {field}: {source}")]
    InvalidRegex {
        /// 1-based position in the selector list
        index: usize,
        /// "name", "region", "engine" or "tag 'Key'"
        field: String,
        #[source]
        source: regex::Error,
    },
}

/// A cron expression that could not be parsed
#[derive(Debug, Error)]
pub enum CronError {
    #[error("cron expression '{expr}' must have 5 fields, found {found}")]
    FieldCount { expr: String, found: usize },

    #[error("cron expression '{expr}' has an invalid day-of-week field: {field}")]
    DayOfWeek { expr: String, field: String },

    #[error("invalid cron expression '{expr}': {source}")]
    Parse {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Errors surfaced by the scheduling and recommendation operations
#[derive(Debug, Error)]
pub enum SnoozeError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Cron(#[from] CronError),

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("provider {0} not registered")]
    ProviderNotRegistered(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("recommendation not found: {0}")]
    RecommendationNotFound(String),

    #[error("recommendation {id} is {status}, only pending recommendations can be resolved")]
    InvalidTransition { id: String, status: String },

    #[error("invalid recommendation status: {0}")]
    InvalidStatus(String),

    #[error("malformed stored document: {0}")]
    Document(#[from] serde_json::Error),
}

pub type SnoozeResult<T> = Result<T, SnoozeError>;
