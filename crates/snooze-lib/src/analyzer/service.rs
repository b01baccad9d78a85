//! Analyzer service: batch analysis, recommendation lifecycle and the
//! periodic analysis loop

use super::patterns::{analyze_activity_pattern, ActivityThresholds};
use super::recommendation::build_recommendation;
use crate::error::SnoozeError;
use crate::health::{components, HealthRegistry};
use crate::models::{
    ActivityPattern, Matcher, Recommendation, RecommendationStatus, Schedule, Selector,
};
use crate::observability::{SnoozeMetrics, StructuredLogger};
use crate::store::{InstanceStore, MetricsStore, RecommendationStore, ScheduleStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the analyzer
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// How far back metrics are read (default: 14 days)
    pub lookback_days: i64,
    /// Windows scoring below this confidence produce no recommendation
    pub confidence_minimum: f64,
    pub thresholds: ActivityThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            confidence_minimum: 0.5,
            thresholds: ActivityThresholds::default(),
        }
    }
}

pub struct Analyzer {
    instances: Arc<dyn InstanceStore>,
    metrics: Arc<dyn MetricsStore>,
    recommendations: Arc<dyn RecommendationStore>,
    schedules: Arc<dyn ScheduleStore>,
    config: AnalyzerConfig,
    prometheus: SnoozeMetrics,
    logger: StructuredLogger,
}

impl Analyzer {
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        metrics: Arc<dyn MetricsStore>,
        recommendations: Arc<dyn RecommendationStore>,
        schedules: Arc<dyn ScheduleStore>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            instances,
            metrics,
            recommendations,
            schedules,
            config,
            prometheus: SnoozeMetrics::new(),
            logger: StructuredLogger::new("analyzer"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub async fn analyze_instance(&self, instance_id: &str) -> Result<ActivityPattern> {
        self.analyze_instance_at(instance_id, Utc::now()).await
    }

    /// Analyze the `lookback_days` of metrics ending at `now`.
    /// Too little data yields a pattern with `has_sufficient_data == false`.
    pub async fn analyze_instance_at(
        &self,
        instance_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActivityPattern> {
        let sufficient = self
            .metrics
            .has_sufficient_data(instance_id)
            .await
            .with_context(|| format!("checking data for {}", instance_id))?;
        if !sufficient {
            let data_hours = self
                .metrics
                .data_hours(instance_id)
                .await
                .with_context(|| format!("counting data hours for {}", instance_id))?;
            debug!(
                instance_id = %instance_id,
                data_hours = data_hours,
                "Not enough metrics history yet"
            );
            return Ok(ActivityPattern::insufficient(instance_id, data_hours));
        }

        let start = now - Duration::days(self.config.lookback_days);
        let metrics = self
            .metrics
            .get_metrics_by_instance(instance_id, start, now)
            .await
            .with_context(|| format!("reading metrics for {}", instance_id))?;

        Ok(analyze_activity_pattern(
            instance_id,
            &metrics,
            &self.config.thresholds,
        ))
    }

    pub async fn analyze_all(&self) -> Result<BTreeMap<String, ActivityPattern>> {
        self.analyze_all_at(Utc::now()).await
    }

    /// Analyze every managed instance. Per-instance failures are logged and
    /// skipped; only patterns with at least one idle window are returned.
    pub async fn analyze_all_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, ActivityPattern>> {
        let instances = self
            .instances
            .list_instances()
            .await
            .context("listing instances")?;

        let mut patterns = BTreeMap::new();
        for instance in instances.iter().filter(|i| i.managed) {
            match self.analyze_instance_at(&instance.id, now).await {
                Ok(pattern) if !pattern.idle_windows.is_empty() => {
                    patterns.insert(instance.id.clone(), pattern);
                }
                Ok(pattern) => {
                    debug!(
                        instance_id = %instance.id,
                        sufficient = pattern.has_sufficient_data,
                        "No idle windows found"
                    );
                }
                Err(e) => {
                    self.prometheus.inc_analysis_errors();
                    warn!(
                        instance_id = %instance.id,
                        error = %format!("{:#}", e),
                        "Activity analysis failed"
                    );
                }
            }
        }

        Ok(patterns)
    }

    pub async fn generate_recommendations(&self) -> Result<Vec<Recommendation>> {
        self.generate_recommendations_at(Utc::now()).await
    }

    /// Create a pending recommendation from the best idle window of every
    /// analyzed instance that does not already have one pending
    pub async fn generate_recommendations_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>> {
        let patterns = self.analyze_all_at(now).await?;

        let pending: HashSet<String> = self
            .recommendations
            .list_by_status(RecommendationStatus::Pending)
            .await
            .context("listing pending recommendations")?
            .into_iter()
            .map(|r| r.instance_id)
            .collect();

        let mut created = Vec::new();
        for (instance_id, pattern) in &patterns {
            if pending.contains(instance_id) {
                debug!(instance_id = %instance_id, "Recommendation already pending");
                continue;
            }
            let Some(window) = pattern.best_window() else {
                continue;
            };
            if window.confidence < self.config.confidence_minimum {
                debug!(
                    instance_id = %instance_id,
                    confidence = window.confidence,
                    "Best window below confidence minimum"
                );
                continue;
            }
            let instance = match self.instances.get_instance(instance_id).await {
                Ok(Some(instance)) => instance,
                Ok(None) => continue,
                Err(e) => {
                    warn!(instance_id = %instance_id, error = %e, "Failed to load instance");
                    continue;
                }
            };

            let recommendation = build_recommendation(&instance, window);
            if let Err(e) = self
                .recommendations
                .create_recommendation(recommendation.clone())
                .await
            {
                warn!(instance_id = %instance_id, error = %e, "Failed to store recommendation");
                continue;
            }

            self.logger.log_recommendation_created(
                &recommendation.id,
                &recommendation.instance_id,
                recommendation.confidence_score,
                recommendation.estimated_daily_savings_cents,
            );
            created.push(recommendation);
        }

        self.prometheus
            .inc_recommendations_generated(created.len() as u64);
        info!(
            analyzed = patterns.len(),
            created = created.len(),
            "Recommendation pass complete"
        );

        Ok(created)
    }

    /// Approve a pending recommendation and create the schedule it suggests
    pub async fn approve(&self, recommendation_id: &str) -> Result<Schedule> {
        let mut recommendation = self.pending_recommendation(recommendation_id).await?;

        let instance = self
            .instances
            .get_instance(&recommendation.instance_id)
            .await?
            .ok_or_else(|| SnoozeError::InstanceNotFound(recommendation.instance_id.clone()))?;

        let now = Utc::now();
        let suggested = &recommendation.suggested_schedule;
        let schedule = Schedule {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("{}-schedule", instance.name),
            description: format!("Created from recommendation {}", recommendation.id),
            selectors: vec![Selector {
                name: Some(Matcher::exact(&instance.name)),
                provider: Some(instance.provider.clone()),
                ..Default::default()
            }],
            timezone: suggested.timezone.clone(),
            sleep_cron: suggested.sleep_cron.clone(),
            wake_cron: suggested.wake_cron.clone(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        schedule.validate()?;

        self.schedules
            .create_schedule(schedule.clone())
            .await
            .context("creating schedule")?;

        recommendation.status = RecommendationStatus::Approved;
        recommendation.resolved_at = Some(now);
        self.recommendations
            .update_recommendation(recommendation)
            .await
            .context("updating recommendation")?;

        info!(
            recommendation_id = %recommendation_id,
            schedule_id = %schedule.id,
            "Recommendation approved"
        );
        Ok(schedule)
    }

    pub async fn dismiss(&self, recommendation_id: &str) -> Result<Recommendation> {
        let mut recommendation = self.pending_recommendation(recommendation_id).await?;

        recommendation.status = RecommendationStatus::Dismissed;
        recommendation.resolved_at = Some(Utc::now());
        self.recommendations
            .update_recommendation(recommendation.clone())
            .await
            .context("updating recommendation")?;

        info!(recommendation_id = %recommendation_id, "Recommendation dismissed");
        Ok(recommendation)
    }

    async fn pending_recommendation(&self, id: &str) -> Result<Recommendation> {
        let recommendation = self
            .recommendations
            .get_recommendation(id)
            .await?
            .ok_or_else(|| SnoozeError::RecommendationNotFound(id.to_string()))?;

        if recommendation.status != RecommendationStatus::Pending {
            return Err(SnoozeError::InvalidTransition {
                id: id.to_string(),
                status: recommendation.status.to_string(),
            }
            .into());
        }
        Ok(recommendation)
    }
}

/// Periodic recommendation pass, independent of the scheduler loop
pub struct AnalysisLoop {
    analyzer: Arc<Analyzer>,
    interval: std::time::Duration,
    health: Option<HealthRegistry>,
}

impl AnalysisLoop {
    pub fn new(analyzer: Arc<Analyzer>, interval: std::time::Duration) -> Self {
        Self {
            analyzer,
            interval,
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting analysis loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.analyzer.generate_recommendations().await;
                    if let Err(e) = &outcome {
                        warn!(error = %format!("{:#}", e), "Analysis pass failed");
                    }
                    if let Some(health) = &self.health {
                        health.report(components::ANALYZER, &outcome).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down analysis loop");
                    break;
                }
            }
        }
    }
}
