//! Core data models shared by the scheduler and the analyzer

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metric name for average CPU utilization (percent)
pub const METRIC_CPU_UTILIZATION: &str = "CPUUtilization";
/// Metric name for open database connections
pub const METRIC_DATABASE_CONNECTIONS: &str = "DatabaseConnections";
pub const METRIC_READ_IOPS: &str = "ReadIOPS";
pub const METRIC_WRITE_IOPS: &str = "WriteIOPS";
pub const METRIC_FREEABLE_MEMORY: &str = "FreeableMemory";

/// A discovered database instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    /// Identifier understood by the cloud provider (RDS identifier, Cloud SQL name)
    pub provider_id: String,
    /// Cloud provider type: "aws" or "gcp"
    pub provider: String,
    /// Provider connection identifier, e.g. "aws_123456789012_us-east-1"
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub account_id: String,
    pub name: String,
    pub region: String,
    pub engine: String,
    #[serde(default)]
    pub instance_type: String,
    pub status: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub hourly_cost_cents: i64,
    #[serde(default)]
    pub managed: bool,
}

impl Instance {
    /// True when the provider reports the instance as up or coming up
    pub fn is_awake(&self) -> bool {
        matches!(self.status.as_str(), "available" | "starting" | "running")
    }

    /// True when the provider reports the instance as down or going down
    pub fn is_asleep(&self) -> bool {
        matches!(self.status.as_str(), "stopped" | "stopping")
    }
}

/// How a [`Matcher`] compares its pattern with a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Contains,
    Prefix,
    Suffix,
    Regex,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchType::Exact => "exact",
            MatchType::Contains => "contains",
            MatchType::Prefix => "prefix",
            MatchType::Suffix => "suffix",
            MatchType::Regex => "regex",
        };
        f.write_str(s)
    }
}

/// A single-field string matching rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub pattern: String,
    #[serde(rename = "type")]
    pub match_type: MatchType,
}

impl Matcher {
    pub fn new(pattern: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            pattern: pattern.into(),
            match_type,
        }
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchType::Exact)
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchType::Regex)
    }
}

/// Declarative instance predicate. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<Matcher>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, Matcher>,
}

/// A sleep/wake schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selectors: Vec<Selector>,
    /// IANA timezone name the cron expressions are evaluated in
    pub timezone: String,
    /// 5-field cron expression at which matching instances are stopped
    #[serde(default)]
    pub sleep_cron: String,
    /// 5-field cron expression at which matching instances are started
    #[serde(default)]
    pub wake_cron: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Aggregated metric sample for one instance and one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyMetric {
    pub instance_id: String,
    pub metric_name: String,
    /// Bucket start, truncated to the hour (or to 5 minutes for raw samples)
    pub hour: DateTime<Utc>,
    pub avg_value: f64,
    #[serde(default)]
    pub max_value: f64,
    #[serde(default)]
    pub min_value: f64,
    #[serde(default)]
    pub sample_count: u32,
}

/// A recurring low-activity interval detected across several days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleWindow {
    /// 0-23
    pub start_hour: u32,
    /// 0-23, smaller than `start_hour` for overnight windows
    pub end_hour: u32,
    pub days_of_week: Vec<Weekday>,
    pub avg_cpu: f64,
    pub avg_conns: f64,
    /// 0.0-1.0
    pub confidence: f64,
    pub is_overnight: bool,
}

/// Result of analyzing one instance's activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPattern {
    pub instance_id: String,
    pub idle_windows: Vec<IdleWindow>,
    pub has_sufficient_data: bool,
    pub data_hours: usize,
    pub analyzed_at: DateTime<Utc>,
}

impl ActivityPattern {
    pub fn insufficient(instance_id: impl Into<String>, data_hours: usize) -> Self {
        Self {
            instance_id: instance_id.into(),
            idle_windows: Vec::new(),
            has_sufficient_data: false,
            data_hours,
            analyzed_at: Utc::now(),
        }
    }

    /// The highest-confidence window, if any
    pub fn best_window(&self) -> Option<&IdleWindow> {
        self.idle_windows.first()
    }
}

/// Pattern that produced a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub idle_start_hour: u32,
    pub idle_end_hour: u32,
    /// Weekday names, e.g. "Monday"
    pub days_of_week: Vec<String>,
    pub avg_cpu: f64,
    pub confidence: f64,
}

/// Schedule proposed by a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedSchedule {
    pub timezone: String,
    pub sleep_cron: String,
    pub wake_cron: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Dismissed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Approved => "approved",
            RecommendationStatus::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecommendationStatus {
    type Err = crate::error::SnoozeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecommendationStatus::Pending),
            "approved" => Ok(RecommendationStatus::Approved),
            "dismissed" => Ok(RecommendationStatus::Dismissed),
            other => Err(crate::error::SnoozeError::InvalidStatus(other.to_string())),
        }
    }
}

/// Suggested schedule for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub instance_id: String,
    pub detected_pattern: DetectedPattern,
    pub suggested_schedule: SuggestedSchedule,
    /// 0-100
    pub confidence_score: f64,
    pub estimated_daily_savings_cents: i64,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Storage row for a recommendation. Pattern and schedule are opaque JSON
/// documents here; everything above the store works with the typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub id: String,
    pub instance_id: String,
    pub detected_pattern: serde_json::Value,
    pub suggested_schedule: serde_json::Value,
    pub confidence_score: f64,
    pub estimated_daily_savings_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<&Recommendation> for RecommendationRecord {
    type Error = serde_json::Error;

    fn try_from(rec: &Recommendation) -> Result<Self, Self::Error> {
        Ok(Self {
            id: rec.id.clone(),
            instance_id: rec.instance_id.clone(),
            detected_pattern: serde_json::to_value(&rec.detected_pattern)?,
            suggested_schedule: serde_json::to_value(&rec.suggested_schedule)?,
            confidence_score: rec.confidence_score,
            estimated_daily_savings_cents: rec.estimated_daily_savings_cents,
            status: rec.status.as_str().to_string(),
            created_at: rec.created_at,
            resolved_at: rec.resolved_at,
        })
    }
}

impl TryFrom<RecommendationRecord> for Recommendation {
    type Error = crate::error::SnoozeError;

    fn try_from(row: RecommendationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            detected_pattern: serde_json::from_value(row.detected_pattern)?,
            suggested_schedule: serde_json::from_value(row.suggested_schedule)?,
            status: row.status.parse()?,
            id: row.id,
            instance_id: row.instance_id,
            confidence_score: row.confidence_score,
            estimated_daily_savings_cents: row.estimated_daily_savings_cents,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Sleep,
    Wake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Schedule,
    Manual,
}

/// Audit record of a requested start/stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub instance_id: String,
    pub event_type: EventType,
    pub triggered_by: TriggeredBy,
    pub previous_status: String,
    pub new_status: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Manual exemption from scheduled actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    pub id: String,
    pub instance_id: String,
    /// When set, only this action ("start" or "stop") is suppressed
    #[serde(default)]
    pub skip_action: Option<String>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub expired: bool,
}

impl Override {
    /// Whether this override suppresses `action` at `now`
    pub fn suppresses(&self, action: &str, now: DateTime<Utc>) -> bool {
        if self.expired {
            return false;
        }
        if self.until.map(|until| until <= now).unwrap_or(false) {
            return false;
        }
        self.skip_action
            .as_deref()
            .map(|skip| skip == action)
            .unwrap_or(true)
    }
}

/// Sunday-based day number (Sunday=0 .. Saturday=6), as used by cron
pub fn weekday_number(day: Weekday) -> u32 {
    day.num_days_from_sunday()
}

/// Full English weekday name
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}
