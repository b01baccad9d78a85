//! Schedule validation and evaluation

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use snooze_lib::models::Schedule;
use snooze_lib::scheduler::{next_fire_after, resolve_timezone, upcoming, ScheduleEvaluator};
use std::path::Path;
use tabled::Tabled;

use super::load_list;
use crate::output::{
    color_status, print_json, print_success, print_table, print_warning, OutputFormat,
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M %Z";

#[derive(Debug, Serialize, Tabled)]
pub struct ValidationRow {
    #[tabled(rename = "Schedule")]
    pub name: String,
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

pub fn validation_rows(schedules: &[Schedule]) -> Vec<ValidationRow> {
    schedules
        .iter()
        .map(|schedule| {
            let (status, error) = match schedule.validate() {
                Ok(()) => ("valid", String::new()),
                Err(e) => ("invalid", e.to_string()),
            };
            ValidationRow {
                name: schedule.name.clone(),
                id: schedule.id.clone(),
                status: status.to_string(),
                error,
            }
        })
        .collect()
}

pub fn validate(path: &Path, format: OutputFormat) -> Result<()> {
    let schedules: Vec<Schedule> = load_list(path, "schedules")?;
    let rows = validation_rows(&schedules);
    let invalid = rows.iter().filter(|r| r.status == "invalid").count();

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let colored: Vec<ValidationRow> = rows
                .into_iter()
                .map(|row| ValidationRow {
                    status: color_status(&row.status),
                    ..row
                })
                .collect();
            print_table(&colored, "No schedules found");
        }
    }

    if invalid > 0 {
        bail!("{} of {} schedules are invalid", invalid, schedules.len());
    }
    if format == OutputFormat::Table && !schedules.is_empty() {
        print_success(&format!("{} schedules valid", schedules.len()));
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
pub struct EvaluationRow {
    #[tabled(rename = "Schedule")]
    pub name: String,
    #[tabled(rename = "Enabled")]
    pub enabled: bool,
    #[tabled(rename = "Timezone")]
    pub timezone: String,
    #[tabled(rename = "Action")]
    pub action: String,
    #[tabled(rename = "Next Sleep")]
    pub next_sleep: String,
    #[tabled(rename = "Next Wake")]
    pub next_wake: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct FireRow {
    #[tabled(rename = "Schedule")]
    pub name: String,
    #[tabled(rename = "Action")]
    pub action: String,
    #[tabled(rename = "At")]
    pub at: String,
}

fn next_fire(expr: &str, schedule: &Schedule, at: DateTime<Utc>) -> String {
    if expr.is_empty() {
        return "-".to_string();
    }
    let local = at.with_timezone(&resolve_timezone(&schedule.timezone));
    match next_fire_after(expr, &local) {
        Ok(Some(next)) => next.format(TIME_FORMAT).to_string(),
        Ok(None) => "never".to_string(),
        Err(_) => "invalid".to_string(),
    }
}

/// What each schedule calls for in the minute containing `at`
pub fn evaluation_rows(schedules: &[Schedule], at: DateTime<Utc>) -> Vec<EvaluationRow> {
    let evaluator = ScheduleEvaluator::new();
    schedules
        .iter()
        .map(|schedule| EvaluationRow {
            name: schedule.name.clone(),
            enabled: schedule.enabled,
            timezone: resolve_timezone(&schedule.timezone).name().to_string(),
            action: evaluator.determine_action(schedule, at).to_string(),
            next_sleep: next_fire(&schedule.sleep_cron, schedule, at),
            next_wake: next_fire(&schedule.wake_cron, schedule, at),
        })
        .collect()
}

/// The next `count` sleep and wake times of every schedule, merged in time order
pub fn fire_rows(schedules: &[Schedule], at: DateTime<Utc>, count: usize) -> Vec<FireRow> {
    let mut fires: Vec<(DateTime<Utc>, FireRow)> = Vec::new();

    for schedule in schedules {
        let local = at.with_timezone(&resolve_timezone(&schedule.timezone));
        for (action, expr) in [("stop", &schedule.sleep_cron), ("start", &schedule.wake_cron)] {
            if expr.is_empty() {
                continue;
            }
            let Ok(times) = upcoming(expr, &local, count) else {
                continue;
            };
            for time in times {
                fires.push((
                    time.with_timezone(&Utc),
                    FireRow {
                        name: schedule.name.clone(),
                        action: action.to_string(),
                        at: time.format(TIME_FORMAT).to_string(),
                    },
                ));
            }
        }
    }

    fires.sort_by(|a, b| a.0.cmp(&b.0));
    fires.into_iter().map(|(_, row)| row).collect()
}

pub fn evaluate(
    path: &Path,
    at: Option<DateTime<Utc>>,
    upcoming_count: usize,
    format: OutputFormat,
) -> Result<()> {
    let schedules: Vec<Schedule> = load_list(path, "schedules")?;
    let at = at.unwrap_or_else(Utc::now);

    let rows = evaluation_rows(&schedules, at);
    let fires = if upcoming_count > 0 {
        fire_rows(&schedules, at, upcoming_count)
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "evaluated_at": at,
            "schedules": rows,
            "upcoming": fires,
        }))?,
        OutputFormat::Table => {
            println!("Evaluated at {}", at.format(TIME_FORMAT));
            let colored: Vec<EvaluationRow> = rows
                .into_iter()
                .map(|row| EvaluationRow {
                    action: color_status(&row.action),
                    ..row
                })
                .collect();
            print_table(&colored, "No schedules found");

            if upcoming_count > 0 {
                if fires.is_empty() {
                    print_warning("No upcoming actions");
                } else {
                    println!();
                    print_table(&fires, "No upcoming actions");
                }
            }
        }
    }

    Ok(())
}
