//! Daemon configuration

use anyhow::Result;
use serde::Deserialize;
use snooze_lib::analyzer::AnalyzerConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Daemon configuration, read from `SNOOZE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct SnoozeConfig {
    /// Name reported in structured log events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON file describing provider connections, schedules, metrics and overrides
    #[serde(default = "default_inventory_path")]
    pub inventory_path: PathBuf,

    /// Scheduler pass interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Recommendation pass interval in seconds
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    /// Provider discovery interval in seconds
    #[serde(default = "default_inventory_sync_interval")]
    pub inventory_sync_interval_secs: u64,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    #[serde(default = "default_confidence_minimum")]
    pub confidence_minimum: f64,

    /// Log actions without calling providers
    #[serde(default)]
    pub dry_run: bool,

    /// Comma-separated tag keys that opt an instance into automation
    #[serde(default)]
    pub managed_tags: String,
}

fn default_service_name() -> String {
    "snoozed".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_inventory_path() -> PathBuf {
    PathBuf::from("inventory.json")
}

fn default_tick_interval() -> u64 {
    60
}

fn default_analysis_interval() -> u64 {
    6 * 60 * 60
}

fn default_inventory_sync_interval() -> u64 {
    300
}

fn default_lookback_days() -> i64 {
    14
}

fn default_confidence_minimum() -> f64 {
    0.5
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            inventory_path: default_inventory_path(),
            tick_interval_secs: default_tick_interval(),
            analysis_interval_secs: default_analysis_interval(),
            inventory_sync_interval_secs: default_inventory_sync_interval(),
            lookback_days: default_lookback_days(),
            confidence_minimum: default_confidence_minimum(),
            dry_run: false,
            managed_tags: String::new(),
        }
    }
}

impl SnoozeConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SNOOZE"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid configuration, using defaults");
            SnoozeConfig::default()
        }))
    }

    pub fn managed_tags(&self) -> Vec<String> {
        self.managed_tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs.max(1))
    }

    pub fn inventory_sync_interval(&self) -> Duration {
        Duration::from_secs(self.inventory_sync_interval_secs.max(1))
    }

    pub fn analyzer(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            lookback_days: self.lookback_days,
            confidence_minimum: self.confidence_minimum,
            ..Default::default()
        }
    }
}
