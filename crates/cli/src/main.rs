//! snoozectl - offline companion to the snooze daemon
//!
//! Validates schedule files, previews which instances a set of selectors
//! picks out, evaluates schedules at a given instant and runs idle-window
//! analysis over exported hourly metrics.

mod commands;
mod output;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{analyze, schedules, selectors};
use snooze_lib::analyzer::ActivityThresholds;
use snooze_lib::selector::SelectorOperator;
use std::path::PathBuf;

/// Snooze database scheduler CLI
#[derive(Parser)]
#[command(name = "snoozectl")]
#[command(author, version, about = "CLI for the Snooze database scheduler", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check schedules for bad crons, timezones and selectors
    Validate {
        /// JSON list of schedules, or an inventory file with a "schedules" list
        file: PathBuf,
    },

    /// Show which instances a list of selectors matches
    Preview {
        /// JSON list of selectors
        #[arg(long, short)]
        selectors: PathBuf,

        /// JSON list of instances, or an object with an "instances" list
        #[arg(long, short)]
        instances: PathBuf,

        /// How selectors combine (and, or)
        #[arg(long, default_value = "or")]
        operator: SelectorOperator,
    },

    /// Show what each schedule does at a given time
    Evaluate {
        /// JSON list of schedules, or an inventory file with a "schedules" list
        file: PathBuf,

        /// Instant to evaluate, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Also list this many upcoming sleep and wake times per schedule
        #[arg(long, default_value_t = 0)]
        upcoming: usize,
    },

    /// Detect idle windows in exported hourly metrics
    Analyze {
        /// JSON list of hourly metrics, or an object with a "metrics" list
        file: PathBuf,

        /// Only analyze this instance id
        #[arg(long)]
        instance: Option<String>,

        /// Hourly instance cost used for the savings estimate
        #[arg(long, default_value_t = 0)]
        hourly_cost_cents: i64,

        /// Windows below this confidence (0-1) get no recommendation
        #[arg(long, default_value_t = 0.5)]
        confidence_minimum: f64,

        /// An hour is idle when mean CPU is below this percentage
        #[arg(long, default_value_t = 1.0)]
        cpu_threshold: f64,

        /// Shortest idle run worth reporting, in hours
        #[arg(long, default_value_t = 8)]
        min_idle_hours: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { file } => schedules::validate(&file, cli.format),
        Commands::Preview {
            selectors: selectors_path,
            instances,
            operator,
        } => selectors::preview(&selectors_path, &instances, operator, cli.format),
        Commands::Evaluate { file, at, upcoming } => {
            schedules::evaluate(&file, at, upcoming, cli.format)
        }
        Commands::Analyze {
            file,
            instance,
            hourly_cost_cents,
            confidence_minimum,
            cpu_threshold,
            min_idle_hours,
        } => {
            let options = analyze::AnalyzeOptions {
                instance,
                hourly_cost_cents,
                confidence_minimum,
                thresholds: ActivityThresholds {
                    cpu_percent: cpu_threshold,
                    min_idle_hours,
                    ..Default::default()
                },
            };
            analyze::analyze(&file, &options, cli.format)
        }
    }
}
