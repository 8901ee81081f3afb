//! List command implementation.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use vmtest_runner::HarnessConfig;

use super::{OutputFormat, load_matrix};

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Unit patterns: release/scenario, release/*, */scenario or a bare id
    pub patterns: Vec<String>,

    /// Only show enabled units
    #[arg(long)]
    pub enabled: bool,
}

#[derive(Serialize)]
struct Row<'a> {
    unit: String,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Executes the list command.
pub fn execute(args: ListArgs, config: &HarnessConfig, format: OutputFormat) -> Result<bool> {
    let matrix = load_matrix(config)?;
    let rows: Vec<Row<'_>> = matrix
        .select(&args.patterns)
        .into_iter()
        .filter(|u| !args.enabled || u.is_enabled())
        .map(|u| Row {
            unit: u.id().to_string(),
            enabled: u.is_enabled(),
            reason: u.enablement().reason(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => {
            println!("{:<48} {:<10} {}", "UNIT", "STATE", "REASON");
            for row in &rows {
                let state = if row.enabled { "enabled" } else { "disabled" };
                println!("{:<48} {:<10} {}", row.unit, state, row.reason.unwrap_or("-"));
            }
        }
    }
    Ok(true)
}
