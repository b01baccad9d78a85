//! Activity analysis and schedule recommendations
//!
//! Detects recurring idle windows in hourly metrics and turns the best one
//! per instance into a suggested sleep/wake schedule.

mod patterns;
mod recommendation;
mod service;


pub use patterns::{
    analyze_activity_pattern, build_hour_buckets, calculate_confidence, count_data_hours,
    find_idle_segments, find_idle_windows, group_similar_windows, segment_duration,
    ActivityThresholds, HourBucket, IdleSegment, WeekBuckets, MIN_DATA_HOURS, WEEKDAYS,
};
pub use recommendation::{
    build_recommendation, cron_days, cron_for_hour, estimated_daily_savings, SUGGESTED_TIMEZONE,
};
pub use service::{AnalysisLoop, Analyzer, AnalyzerConfig};
