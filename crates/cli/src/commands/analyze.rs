//! Offline idle-window analysis of exported hourly metrics

use anyhow::Result;
use serde::Serialize;
use snooze_lib::analyzer::{
    analyze_activity_pattern, build_recommendation, cron_days, ActivityThresholds,
};
use snooze_lib::models::{ActivityPattern, HourlyMetric, Instance, Recommendation};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tabled::Tabled;

use super::load_list;
use crate::output::{
    color_confidence, format_cents, format_hour, print_info, print_json, print_table,
    print_warning, OutputFormat,
};

/// Knobs exposed on the command line
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub instance: Option<String>,
    pub hourly_cost_cents: i64,
    pub confidence_minimum: f64,
    pub thresholds: ActivityThresholds,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            instance: None,
            hourly_cost_cents: 0,
            confidence_minimum: 0.5,
            thresholds: ActivityThresholds::default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub pattern: ActivityPattern,
    pub recommendation: Option<Recommendation>,
}

#[derive(Debug, Tabled)]
struct WindowRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Idle From")]
    start: String,
    #[tabled(rename = "Idle Until")]
    end: String,
    #[tabled(rename = "Days")]
    days: String,
    #[tabled(rename = "Avg CPU")]
    avg_cpu: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

#[derive(Debug, Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Sleep")]
    sleep_cron: String,
    #[tabled(rename = "Wake")]
    wake_cron: String,
    #[tabled(rename = "Timezone")]
    timezone: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Daily Savings")]
    savings: String,
}

/// Analyze every instance present in `metrics`, in instance id order
pub fn analyze_metrics(metrics: Vec<HourlyMetric>, options: &AnalyzeOptions) -> Vec<AnalysisReport> {
    let mut by_instance: BTreeMap<String, Vec<HourlyMetric>> = BTreeMap::new();
    for metric in metrics {
        if let Some(wanted) = &options.instance {
            if &metric.instance_id != wanted {
                continue;
            }
        }
        by_instance
            .entry(metric.instance_id.clone())
            .or_default()
            .push(metric);
    }

    by_instance
        .into_iter()
        .map(|(instance_id, samples)| {
            let pattern = analyze_activity_pattern(&instance_id, &samples, &options.thresholds);
            let recommendation = pattern
                .best_window()
                .filter(|window| window.confidence >= options.confidence_minimum)
                .map(|window| {
                    build_recommendation(&placeholder_instance(&instance_id, options), window)
                });
            AnalysisReport {
                pattern,
                recommendation,
            }
        })
        .collect()
}

/// Metrics exports carry no inventory, so the instance is known by id only
fn placeholder_instance(instance_id: &str, options: &AnalyzeOptions) -> Instance {
    Instance {
        id: instance_id.to_string(),
        provider_id: instance_id.to_string(),
        provider: String::new(),
        provider_name: String::new(),
        account_id: String::new(),
        name: instance_id.to_string(),
        region: String::new(),
        engine: String::new(),
        instance_type: String::new(),
        status: String::new(),
        tags: HashMap::new(),
        hourly_cost_cents: options.hourly_cost_cents,
        managed: true,
    }
}

pub fn analyze(path: &Path, options: &AnalyzeOptions, format: OutputFormat) -> Result<()> {
    let metrics: Vec<HourlyMetric> = load_list(path, "metrics")?;
    let reports = analyze_metrics(metrics, options);

    if format == OutputFormat::Json {
        return print_json(&reports);
    }

    if reports.is_empty() {
        print_warning("No metrics found");
        return Ok(());
    }

    for report in reports.iter().filter(|r| !r.pattern.has_sufficient_data) {
        print_warning(&format!(
            "{}: only {} hours of data, need {}",
            report.pattern.instance_id, report.pattern.data_hours, options.thresholds.min_data_hours
        ));
    }

    let windows: Vec<WindowRow> = reports
        .iter()
        .flat_map(|report| {
            report.pattern.idle_windows.iter().map(|window| WindowRow {
                instance: report.pattern.instance_id.clone(),
                start: format_hour(window.start_hour),
                end: format_hour(window.end_hour),
                days: cron_days(&window.days_of_week),
                avg_cpu: format!("{:.2}%", window.avg_cpu),
                confidence: color_confidence(window.confidence),
            })
        })
        .collect();
    print_table(&windows, "No idle windows detected");

    let recommendations: Vec<RecommendationRow> = reports
        .iter()
        .filter_map(|report| report.recommendation.as_ref())
        .map(|rec| RecommendationRow {
            instance: rec.instance_id.clone(),
            sleep_cron: rec.suggested_schedule.sleep_cron.clone(),
            wake_cron: rec.suggested_schedule.wake_cron.clone(),
            timezone: rec.suggested_schedule.timezone.clone(),
            confidence: color_confidence(rec.confidence_score / 100.0),
            savings: format_cents(rec.estimated_daily_savings_cents),
        })
        .collect();
    if !recommendations.is_empty() {
        println!();
        print_table(&recommendations, "No recommendations");
        print_info(&format!("{} recommended schedules", recommendations.len()));
    }

    Ok(())
}
