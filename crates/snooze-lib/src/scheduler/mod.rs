//! Schedule evaluation and the start/stop control loop
//!
//! The [`ScheduleEvaluator`] decides, once per minute, whether a schedule's
//! wake or sleep cron fired; the [`SchedulerLoop`] applies those decisions to
//! matching instances through the provider registry.

mod control;
mod cron_expr;
mod evaluator;

#[cfg(test)]
mod tests;

pub use control::{SchedulerConfig, SchedulerLoop, TickReport};
pub use cron_expr::{next_fire_after, parse_cron, upcoming, validate_cron};
pub use evaluator::{resolve_timezone, ScheduleEvaluator};

use serde::{Deserialize, Serialize};

/// What a schedule asks for in the current minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    None,
    Start,
    Stop,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Start => "start",
            Action::Stop => "stop",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
