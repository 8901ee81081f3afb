//! CLI command implementations.
//!
//! - Matrix inspection (list, show)
//! - Execution (run)
//! - Offline re-verification of a kept unit directory (verify)
//! - Effective configuration (config)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use vmtest_core::{Matrix, TestUnit, UnitId, builtin};
use vmtest_runner::HarnessConfig;

pub mod list;
pub mod run;
pub mod show;
pub mod verify;

/// vmtest - boot, install, collect and verify installer VM tests
#[derive(Parser)]
#[command(name = "vmtest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file to use instead of ~/.config/vmtest/config.toml
    #[arg(long, global = true, env = "VMTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// List test units and whether they are enabled
    List(list::ListArgs),

    /// Show the provisioning spec, collection script and assertions of a unit
    Show(show::ShowArgs),

    /// Run test units
    Run(run::RunArgs),

    /// Re-run a unit's assertions against an existing artifact directory
    Verify(verify::VerifyArgs),

    /// Print the effective configuration
    Config,
}

/// Composes the built-in matrix with configured overrides.
pub fn load_matrix(config: &HarnessConfig) -> Result<Matrix> {
    let catalog = builtin::catalog()?;
    let compat = builtin::compat_table()?.extended(config.matrix.overrides.iter().cloned());
    Ok(Matrix::compose(
        &catalog,
        &compat,
        config.matrix.config_root.as_deref(),
    )?)
}

/// Looks up one unit by its `release/scenario` identity.
pub fn find_unit<'a>(matrix: &'a Matrix, id: &str) -> Result<&'a TestUnit> {
    let id = UnitId::parse(id)?;
    matrix
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("no test unit {id}; see `vmtest list`"))
}
