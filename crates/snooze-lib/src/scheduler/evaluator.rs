//! Per-minute schedule evaluation with once-per-minute deduplication

use super::cron_expr::{next_fire_after, validate_cron};
use super::Action;
use crate::error::{SnoozeError, SnoozeResult};
use crate::models::Schedule;
use crate::selector::validate_selectors;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

/// Minute index since the epoch; equal indices mean the same wall-clock minute
fn minute_index<Z: chrono::TimeZone>(t: &DateTime<Z>) -> i64 {
    t.timestamp().div_euclid(60)
}

/// Resolve an IANA timezone name, falling back to UTC.
/// An empty name means UTC.
pub fn resolve_timezone(name: &str) -> Tz {
    if name.is_empty() {
        return Tz::UTC;
    }
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(e) => {
            warn!(timezone = %name, error = %e, "Unknown timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Decides start/stop per schedule and remembers what already fired.
///
/// The last-fired map is owned by the evaluator, so two evaluators never
/// share deduplication state.
#[derive(Debug, Default)]
pub struct ScheduleEvaluator {
    /// "<schedule_id>_<action>" -> minute index of the last firing
    last_fired: DashMap<String, i64>,
}

impl ScheduleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Which action, if any, `schedule` calls for in the minute containing `now`.
    ///
    /// Looks one minute back and asks each cron for its next fire after that
    /// point; a fire landing in the current minute triggers. Wake is checked
    /// before sleep.
    pub fn determine_action(&self, schedule: &Schedule, now: DateTime<Utc>) -> Action {
        let tz = resolve_timezone(&schedule.timezone);
        let local = now.with_timezone(&tz);
        let current_minute = minute_index(&local);
        let check = local - Duration::minutes(1);

        if fires_in_minute(&schedule.id, "wake", &schedule.wake_cron, &check, current_minute) {
            return Action::Start;
        }
        if fires_in_minute(&schedule.id, "sleep", &schedule.sleep_cron, &check, current_minute) {
            return Action::Stop;
        }
        Action::None
    }

    /// True the first time `(schedule_id, action)` is seen in the minute
    /// containing `now`, false on every later call in that minute.
    pub fn should_execute(&self, schedule_id: &str, action: Action, now: DateTime<Utc>) -> bool {
        let key = format!("{}_{}", schedule_id, action.as_str());
        let minute = minute_index(&now);

        match self.last_fired.entry(key) {
            Entry::Occupied(mut entry) => {
                if *entry.get() == minute {
                    return false;
                }
                entry.insert(minute);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(minute);
                true
            }
        }
    }

    /// Drop dedup entries for schedules that no longer exist
    pub fn retain_schedules(&self, schedule_ids: &[&str]) {
        self.last_fired.retain(|key, _| {
            key.rsplit_once('_')
                .map(|(id, _)| schedule_ids.contains(&id))
                .unwrap_or(false)
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_fired.len()
    }
}

fn fires_in_minute(
    schedule_id: &str,
    edge: &str,
    expr: &str,
    check: &DateTime<Tz>,
    current_minute: i64,
) -> bool {
    if expr.trim().is_empty() {
        return false;
    }

    match next_fire_after(expr, check) {
        Ok(Some(next)) => minute_index(&next) == current_minute,
        Ok(None) => false,
        Err(e) => {
            warn!(
                schedule_id = %schedule_id,
                edge = edge,
                error = %e,
                "Invalid cron expression, treating as non-firing"
            );
            false
        }
    }
}

impl Schedule {
    /// Reject schedules the evaluator could only degrade on: missing name,
    /// unknown timezone, unparsable cron or invalid selector regex.
    pub fn validate(&self) -> SnoozeResult<()> {
        if self.name.trim().is_empty() {
            return Err(SnoozeError::InvalidSchedule("name is required".to_string()));
        }
        if self.sleep_cron.trim().is_empty() && self.wake_cron.trim().is_empty() {
            return Err(SnoozeError::InvalidSchedule(
                "at least one of sleep_cron and wake_cron is required".to_string(),
            ));
        }
        if !self.timezone.is_empty() && self.timezone.parse::<Tz>().is_err() {
            return Err(SnoozeError::InvalidTimezone(self.timezone.clone()));
        }
        for expr in [&self.sleep_cron, &self.wake_cron] {
            if !expr.trim().is_empty() {
                validate_cron(expr)?;
            }
        }
        validate_selectors(&self.selectors)?;

        debug!(schedule_id = %self.id, "Schedule validated");
        Ok(())
    }
}
