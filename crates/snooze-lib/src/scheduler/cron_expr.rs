//! Five-field cron expressions on top of the `cron` crate
//!
//! Schedules use the classic `minute hour day-of-month month day-of-week`
//! form with Sunday as 0 (7 is accepted as Sunday too). The `cron` crate
//! wants a leading seconds field and numbers weekdays from Sunday = 1, so
//! expressions are translated before parsing. `@daily` style shorthands are
//! passed through unchanged.

use crate::error::CronError;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use std::str::FromStr;

const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Longest clock jump a fire time is moved across
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Parse a 5-field expression into a `cron::Schedule`
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, CronError> {
    let expr = expr.trim();
    let translated = translate(expr)?;

    cron::Schedule::from_str(&translated).map_err(|source| CronError::Parse {
        expr: expr.to_string(),
        source,
    })
}

/// Check that `expr` is a usable 5-field expression
pub fn validate_cron(expr: &str) -> Result<(), CronError> {
    parse_cron(expr).map(|_| ())
}

/// First fire time strictly after `after`, in `after`'s timezone.
///
/// Fire times are wall-clock times. One that falls in a daylight saving gap
/// fires at the first valid minute after the gap, and one that occurs twice
/// fires on its first occurrence only.
pub fn next_fire_after<Z: TimeZone>(
    expr: &str,
    after: &DateTime<Z>,
) -> Result<Option<DateTime<Z>>, CronError> {
    Ok(next_after(&parse_cron(expr)?, after))
}

/// The next `count` fire times strictly after `after`
pub fn upcoming<Z: TimeZone>(
    expr: &str,
    after: &DateTime<Z>,
    count: usize,
) -> Result<Vec<DateTime<Z>>, CronError> {
    let schedule = parse_cron(expr)?;
    let mut fires: Vec<DateTime<Z>> = Vec::with_capacity(count);
    let mut cursor = after.clone();

    while fires.len() < count {
        match next_after(&schedule, &cursor) {
            Some(next) => {
                cursor = next.clone();
                fires.push(next);
            }
            None => break,
        }
    }
    Ok(fires)
}

/// Walk the schedule on the naive local clock, then place each wall-clock
/// fire back in `after`'s zone.
fn next_after<Z: TimeZone>(schedule: &cron::Schedule, after: &DateTime<Z>) -> Option<DateTime<Z>> {
    let tz = after.timezone();
    let wall_clock = Utc.from_utc_datetime(&after.naive_local());

    schedule
        .after(&wall_clock)
        .filter_map(|fire| resolve_local(&tz, fire.naive_utc()))
        .find(|fire| fire > after)
}

/// Earliest instant showing `wall` on the local clock, or the first instant
/// after a gap that skips it
fn resolve_local<Z: TimeZone>(tz: &Z, wall: NaiveDateTime) -> Option<DateTime<Z>> {
    (0..=MAX_GAP_MINUTES).find_map(|step| {
        tz.from_local_datetime(&(wall + Duration::minutes(step)))
            .earliest()
    })
}

fn translate(expr: &str) -> Result<String, CronError> {
    if expr.starts_with('@') {
        return Ok(expr.to_string());
    }

    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(CronError::FieldCount {
            expr: expr.to_string(),
            found: fields.len(),
        });
    }

    let day_of_week = translate_day_of_week(fields[4]).ok_or_else(|| CronError::DayOfWeek {
        expr: expr.to_string(),
        field: fields[4].to_string(),
    })?;

    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    ))
}

/// Rewrite a Sunday=0 day-of-week field into the crate's Sunday=1 numbering
fn translate_day_of_week(field: &str) -> Option<String> {
    let mut items = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step.parse().ok().filter(|s| *s > 0)?;
                (base, Some(step))
            }
            None => (item, None),
        };
        let with_step = |range: String| match step {
            Some(step) => format!("{}/{}", range, step),
            None => range,
        };

        if base == "*" || base == "?" {
            items.push(with_step(base.to_string()));
            continue;
        }

        match base.split_once('-') {
            Some((from, to)) => {
                let from = day_number(from)?;
                let to = day_number(to)?;
                if to == 7 {
                    // a-7 runs to Saturday and then includes Sunday
                    if step.is_some() {
                        return None;
                    }
                    if from == 0 {
                        items.push("*".to_string());
                    } else {
                        items.push(format!("{}-7", from + 1));
                        items.push("1".to_string());
                    }
                } else {
                    if from > to || from == 7 {
                        return None;
                    }
                    items.push(with_step(format!("{}-{}", from + 1, to + 1)));
                }
            }
            None => {
                let day = day_number(base)? % 7;
                match step {
                    Some(_) => items.push(with_step(format!("{}-7", day + 1))),
                    None => items.push((day + 1).to_string()),
                }
            }
        }
    }

    if items.is_empty() {
        return None;
    }
    Some(items.join(","))
}

/// Day number 0-7 from a digit string or three-letter name
fn day_number(token: &str) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return (n <= 7).then_some(n);
    }
    let lower = token.to_ascii_lowercase();
    DAY_NAMES
        .iter()
        .position(|name| *name == lower)
        .map(|i| i as u32)
}
