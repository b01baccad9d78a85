//! Idle-window detection
//!
//! Buckets hourly metrics by weekday and hour of day, finds contiguous
//! low-CPU runs per weekday (wrapping past midnight), then merges runs that
//! recur on several weekdays into scored idle windows.

use crate::models::{
    ActivityPattern, HourlyMetric, IdleWindow, METRIC_CPU_UTILIZATION,
    METRIC_DATABASE_CONNECTIONS, METRIC_READ_IOPS, METRIC_WRITE_IOPS,
};
use chrono::{Datelike, Timelike, Utc, Weekday};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Weekdays in Sunday-first order, the order days are scanned and reported in
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Minimum distinct hours of data before patterns are analyzed
pub const MIN_DATA_HOURS: usize = 24;

/// Thresholds that define "low activity"
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityThresholds {
    /// An hour is idle when its mean CPU is below this percentage
    pub cpu_percent: f64,
    /// Informational only, connections never gate idleness
    pub queries_per_min: f64,
    /// Shortest idle run worth reporting
    pub min_idle_hours: u32,
    /// Distinct hourly timestamps required before analysis
    pub min_data_hours: usize,
    /// Weekdays a window must recur on
    pub min_days_consistent: usize,
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 1.0,
            queries_per_min: 5.0,
            min_idle_hours: 8,
            min_data_hours: MIN_DATA_HOURS,
            min_days_consistent: 3,
        }
    }
}

/// Samples that fell into one (weekday, hour) bucket
#[derive(Debug, Clone, Default)]
pub struct HourBucket {
    pub cpu_values: Vec<f64>,
    pub conn_values: Vec<f64>,
    pub iops_values: Vec<f64>,
}

/// Buckets keyed by (Sunday-based day number, hour of day)
pub type WeekBuckets = HashMap<(u32, u32), HourBucket>;

/// Contiguous idle run within one weekday
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleSegment {
    pub start_hour: u32,
    pub end_hour: u32,
    pub avg_cpu: f64,
    pub avg_conns: f64,
}

/// Analyze one instance's samples. Too few distinct hours is reported through
/// `has_sufficient_data`, never as an error.
pub fn analyze_activity_pattern(
    instance_id: &str,
    metrics: &[HourlyMetric],
    thresholds: &ActivityThresholds,
) -> ActivityPattern {
    let data_hours = count_data_hours(metrics);

    if data_hours < thresholds.min_data_hours {
        debug!(
            instance_id = %instance_id,
            data_hours = data_hours,
            required = thresholds.min_data_hours,
            "Insufficient data for pattern analysis"
        );
        return ActivityPattern::insufficient(instance_id, data_hours);
    }

    let buckets = build_hour_buckets(metrics);
    let idle_windows = find_idle_windows(&buckets, thresholds);

    ActivityPattern {
        instance_id: instance_id.to_string(),
        idle_windows,
        has_sufficient_data: true,
        data_hours,
        analyzed_at: Utc::now(),
    }
}

/// Distinct clock hours covered by `metrics`. Sub-hour samples within the
/// same hour count once.
pub fn count_data_hours(metrics: &[HourlyMetric]) -> usize {
    metrics
        .iter()
        .map(|m| m.hour.timestamp().div_euclid(3600))
        .collect::<HashSet<_>>()
        .len()
}

/// Group samples by weekday and hour of day (UTC)
pub fn build_hour_buckets(metrics: &[HourlyMetric]) -> WeekBuckets {
    let mut buckets = WeekBuckets::new();

    for m in metrics {
        let key = (m.hour.weekday().num_days_from_sunday(), m.hour.hour());
        let bucket = buckets.entry(key).or_default();
        match m.metric_name.as_str() {
            METRIC_CPU_UTILIZATION => bucket.cpu_values.push(m.avg_value),
            METRIC_DATABASE_CONNECTIONS => bucket.conn_values.push(m.avg_value),
            METRIC_READ_IOPS | METRIC_WRITE_IOPS => bucket.iops_values.push(m.avg_value),
            _ => {}
        }
    }

    buckets
}

/// Find idle windows that recur across weekdays, best first
pub fn find_idle_windows(buckets: &WeekBuckets, thresholds: &ActivityThresholds) -> Vec<IdleWindow> {
    let day_segments: Vec<(Weekday, Vec<IdleSegment>)> = WEEKDAYS
        .iter()
        .map(|&day| {
            let idle = idle_hours_for_day(buckets, day, thresholds.cpu_percent);
            (day, find_idle_segments(&idle, thresholds.min_idle_hours))
        })
        .filter(|(_, segments)| !segments.is_empty())
        .collect();

    group_similar_windows(&day_segments, thresholds)
}

/// Per-hour (cpu, conns) averages for the hours of `day` that count as idle
fn idle_hours_for_day(buckets: &WeekBuckets, day: Weekday, cpu_percent: f64) -> [Option<(f64, f64)>; 24] {
    let mut idle = [None; 24];
    let day_number = day.num_days_from_sunday();

    for (hour, slot) in idle.iter_mut().enumerate() {
        let Some(bucket) = buckets.get(&(day_number, hour as u32)) else {
            continue;
        };
        // No CPU samples is not evidence of idleness
        if bucket.cpu_values.is_empty() {
            continue;
        }
        let cpu = average(&bucket.cpu_values);
        if cpu < cpu_percent {
            *slot = Some((cpu, average(&bucket.conn_values)));
        }
    }

    idle
}

/// Collect idle runs of at least `min_idle_hours` from one day's hours.
///
/// The scan starts just after the first busy hour and walks once around the
/// clock, so a run that crosses midnight is reported once as a wrapping
/// segment. A day with no busy hour is a single 0→23 segment.
pub fn find_idle_segments(idle: &[Option<(f64, f64)>; 24], min_idle_hours: u32) -> Vec<IdleSegment> {
    let Some(pivot) = idle.iter().position(Option::is_none) else {
        let mut run = SegmentRun::new(0);
        for (hour, sample) in idle.iter().enumerate() {
            if let Some((cpu, conns)) = sample {
                run.push(hour as u32, *cpu, *conns);
            }
        }
        return run.finish(min_idle_hours).into_iter().collect();
    };

    let mut segments = Vec::new();
    let mut current: Option<SegmentRun> = None;

    for offset in 1..=24 {
        let hour = (pivot + offset) % 24;
        match idle[hour] {
            Some((cpu, conns)) => current
                .get_or_insert_with(|| SegmentRun::new(hour as u32))
                .push(hour as u32, cpu, conns),
            None => {
                if let Some(segment) = current.take().and_then(|r| r.finish(min_idle_hours)) {
                    segments.push(segment);
                }
            }
        }
    }

    segments.sort_by_key(|s| s.start_hour);
    segments
}

/// Accumulates one idle run while scanning
struct SegmentRun {
    start_hour: u32,
    end_hour: u32,
    cpu_sum: f64,
    conn_sum: f64,
    count: u32,
}

impl SegmentRun {
    fn new(start_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour: start_hour,
            cpu_sum: 0.0,
            conn_sum: 0.0,
            count: 0,
        }
    }

    fn push(&mut self, hour: u32, cpu: f64, conns: f64) {
        self.end_hour = hour;
        self.cpu_sum += cpu;
        self.conn_sum += conns;
        self.count += 1;
    }

    fn finish(self, min_idle_hours: u32) -> Option<IdleSegment> {
        if self.count == 0 || segment_duration(self.start_hour, self.end_hour) < min_idle_hours {
            return None;
        }
        Some(IdleSegment {
            start_hour: self.start_hour,
            end_hour: self.end_hour,
            avg_cpu: self.cpu_sum / self.count as f64,
            avg_conns: self.conn_sum / self.count as f64,
        })
    }
}

/// Hours covered by an inclusive start..end range, wrapping past midnight
/// when `end < start`. `segment_duration(22, 6) == 9`.
pub fn segment_duration(start: u32, end: u32) -> u32 {
    if end >= start {
        end - start + 1
    } else {
        (24 - start) + end + 1
    }
}

/// A cross-day group being built
struct WindowGroup {
    start_hour: u32,
    end_hour: u32,
    days: Vec<Weekday>,
    avg_cpu: f64,
    avg_conns: f64,
}

/// Merge segments from different weekdays whose start and end hours are both
/// within one hour of an existing group. The first matching group wins and
/// averages are merged pairwise, `(group + segment) / 2`.
pub fn group_similar_windows(
    day_segments: &[(Weekday, Vec<IdleSegment>)],
    thresholds: &ActivityThresholds,
) -> Vec<IdleWindow> {
    let mut groups: Vec<WindowGroup> = Vec::new();

    for (day, segments) in day_segments {
        for seg in segments {
            let similar = groups.iter_mut().find(|g| {
                g.start_hour.abs_diff(seg.start_hour) <= 1 && g.end_hour.abs_diff(seg.end_hour) <= 1
            });

            match similar {
                Some(group) => {
                    if !group.days.contains(day) {
                        group.days.push(*day);
                    }
                    group.avg_cpu = (group.avg_cpu + seg.avg_cpu) / 2.0;
                    group.avg_conns = (group.avg_conns + seg.avg_conns) / 2.0;
                }
                None => groups.push(WindowGroup {
                    start_hour: seg.start_hour,
                    end_hour: seg.end_hour,
                    days: vec![*day],
                    avg_cpu: seg.avg_cpu,
                    avg_conns: seg.avg_conns,
                }),
            }
        }
    }

    let mut windows: Vec<IdleWindow> = groups
        .into_iter()
        .filter(|g| g.days.len() >= thresholds.min_days_consistent)
        .map(|mut g| {
            g.days.sort_by_key(|d| d.num_days_from_sunday());
            IdleWindow {
                start_hour: g.start_hour,
                end_hour: g.end_hour,
                confidence: calculate_confidence(g.days.len(), g.avg_cpu, thresholds),
                days_of_week: g.days,
                avg_cpu: g.avg_cpu,
                avg_conns: g.avg_conns,
                is_overnight: g.end_hour < g.start_hour,
            }
        })
        .collect();

    windows.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    windows
}

/// Confidence in [0, 1] from how many days agree and how idle they are
pub fn calculate_confidence(num_days: usize, avg_cpu: f64, thresholds: &ActivityThresholds) -> f64 {
    let mut confidence: f64 = 0.5;

    if num_days >= 5 {
        confidence += 0.3;
    } else if num_days >= 3 {
        confidence += 0.2;
    }

    if avg_cpu < 0.5 {
        confidence += 0.2;
    } else if avg_cpu < thresholds.cpu_percent {
        confidence += 0.1;
    }

    confidence.clamp(0.0, 1.0)
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
