//! Selector preview

use anyhow::Result;
use serde::Serialize;
use snooze_lib::models::{Instance, Selector};
use snooze_lib::selector::{match_instance, validate_selectors, SelectorOperator};
use std::path::Path;
use tabled::Tabled;

use super::load_list;
use crate::output::{color_status, print_info, print_json, print_table, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
pub struct MatchRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Provider")]
    pub provider: String,
    #[tabled(rename = "Region")]
    pub region: String,
    #[tabled(rename = "Engine")]
    pub engine: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&Instance> for MatchRow {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            name: instance.name.clone(),
            provider: instance.provider.clone(),
            region: instance.region.clone(),
            engine: instance.engine.clone(),
            status: instance.status.clone(),
        }
    }
}

/// Instances the selectors pick out, in input order
pub fn preview_matches<'a>(
    instances: &'a [Instance],
    selectors: &[Selector],
    operator: SelectorOperator,
) -> Result<Vec<&'a Instance>> {
    validate_selectors(selectors)?;
    Ok(instances
        .iter()
        .filter(|instance| match_instance(instance, selectors, operator))
        .collect())
}

pub fn preview(
    selectors_path: &Path,
    instances_path: &Path,
    operator: SelectorOperator,
    format: OutputFormat,
) -> Result<()> {
    let selectors: Vec<Selector> = load_list(selectors_path, "selectors")?;
    let instances: Vec<Instance> = load_list(instances_path, "instances")?;

    let matched = preview_matches(&instances, &selectors, operator)?;
    let rows: Vec<MatchRow> = matched.into_iter().map(MatchRow::from).collect();

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let colored: Vec<MatchRow> = rows
                .into_iter()
                .map(|row| MatchRow {
                    status: color_status(&row.status),
                    ..row
                })
                .collect();
            print_table(&colored, "No instances matched");
            if !colored.is_empty() {
                print_info(&format!(
                    "{} of {} instances matched",
                    colored.len(),
                    instances.len()
                ));
            }
        }
    }

    Ok(())
}
