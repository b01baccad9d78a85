//! Turning idle windows into schedule recommendations

use super::patterns::segment_duration;
use crate::models::{
    weekday_name, weekday_number, DetectedPattern, IdleWindow, Instance, Recommendation,
    RecommendationStatus, SuggestedSchedule,
};
use chrono::{Utc, Weekday};

/// Hour buckets are computed in UTC, so suggestions are too
pub const SUGGESTED_TIMEZONE: &str = "UTC";

/// Build a pending recommendation from an instance's idle window.
/// Sleep fires at the window start, wake at the window end.
pub fn build_recommendation(instance: &Instance, window: &IdleWindow) -> Recommendation {
    let suggested_schedule = SuggestedSchedule {
        timezone: SUGGESTED_TIMEZONE.to_string(),
        sleep_cron: cron_for_hour(window.start_hour, &window.days_of_week),
        wake_cron: cron_for_hour(window.end_hour, &window.days_of_week),
    };

    let detected_pattern = DetectedPattern {
        idle_start_hour: window.start_hour,
        idle_end_hour: window.end_hour,
        days_of_week: window
            .days_of_week
            .iter()
            .map(|d| weekday_name(*d).to_string())
            .collect(),
        avg_cpu: window.avg_cpu,
        confidence: window.confidence,
    };

    Recommendation {
        id: uuid::Uuid::new_v4().to_string(),
        instance_id: instance.id.clone(),
        detected_pattern,
        suggested_schedule,
        confidence_score: window.confidence * 100.0,
        estimated_daily_savings_cents: estimated_daily_savings(
            instance.hourly_cost_cents,
            window.start_hour,
            window.end_hour,
        ),
        status: RecommendationStatus::Pending,
        created_at: Utc::now(),
        resolved_at: None,
    }
}

/// `0 <hour> * * <days>`
pub fn cron_for_hour(hour: u32, days: &[Weekday]) -> String {
    format!("0 {} * * {}", hour, cron_days(days))
}

/// Day-of-week cron field: `*` for every day, `1-5` for exactly Monday to
/// Friday, otherwise a comma-separated list of Sunday-based day numbers
pub fn cron_days(days: &[Weekday]) -> String {
    let mut numbers: Vec<u32> = days.iter().map(|d| weekday_number(*d)).collect();
    numbers.sort_unstable();
    numbers.dedup();

    if numbers.len() == 7 {
        return "*".to_string();
    }
    if numbers == [1, 2, 3, 4, 5] {
        return "1-5".to_string();
    }

    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Daily savings estimate in cents: idle hours times hourly cost
pub fn estimated_daily_savings(hourly_cost_cents: i64, start_hour: u32, end_hour: u32) -> i64 {
    segment_duration(start_hour, end_hour) as i64 * hourly_cost_cents
}
