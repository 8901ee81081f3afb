//! Run command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use tracing::info;
use vmtest_runner::{
    CommandBackend, HarnessConfig, KeepPolicy, RunReport, RunSettings, Runner, UnitStatus,
};

use super::{OutputFormat, load_matrix};

/// Artifact retention, as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Keep {
    Always,
    OnFailure,
    Never,
}

impl From<Keep> for KeepPolicy {
    fn from(keep: Keep) -> Self {
        match keep {
            Keep::Always => Self::Always,
            Keep::OnFailure => Self::OnFailure,
            Keep::Never => Self::Never,
        }
    }
}

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Unit patterns; all units when omitted
    pub patterns: Vec<String>,

    /// Maximum number of units in flight
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Which unit directories to keep after the run
    #[arg(long, value_enum)]
    pub keep: Option<Keep>,

    /// Launcher program for the command backend
    #[arg(long)]
    pub launcher: Option<PathBuf>,

    /// Root directory for run output
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the run command. Returns false if any unit failed or errored.
pub async fn execute(args: RunArgs, mut config: HarnessConfig, format: OutputFormat) -> Result<bool> {
    if let Some(concurrency) = args.concurrency {
        config.run.concurrency = concurrency;
    }
    if let Some(keep) = args.keep {
        config.run.keep = keep.into();
    }
    if let Some(launcher) = args.launcher {
        config.backend.launcher = launcher;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    config.validate()?;

    let matrix = load_matrix(&config)?;
    let units = matrix.select(&args.patterns);
    if units.is_empty() {
        bail!("no test units match {:?}", args.patterns);
    }

    info!(units = units.len(), launcher = %config.backend.launcher.display(), "selected units");

    let backend = Arc::new(CommandBackend::from_config(&config.backend));
    let runner = Runner::new(backend, RunSettings::from_config(&config));
    let report = runner.run(&units).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_table(&report),
    }
    Ok(report.success())
}

fn print_table(report: &RunReport) {
    println!("{:<48} {:<8} {:>9}  {}", "UNIT", "STATUS", "TIME", "DETAIL");
    for outcome in &report.units {
        let detail = match outcome.status {
            UnitStatus::Passed => String::new(),
            UnitStatus::Skipped => outcome.reason.clone().unwrap_or_default(),
            UnitStatus::Failed => outcome
                .failures
                .iter()
                .map(|f| f.assertion.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            UnitStatus::Errored => outcome
                .error
                .as_ref()
                .map(|e| format!("[{}] {}", e.phase, e.message))
                .unwrap_or_default(),
        };
        let time = format!("{:.1}s", outcome.duration_ms as f64 / 1000.0);
        println!("{:<48} {:<8} {:>9}  {}", outcome.unit.to_string(), outcome.status.to_string(), time, detail);
    }

    for outcome in report.units.iter().filter(|o| o.status == UnitStatus::Failed) {
        println!();
        for failure in &outcome.failures {
            println!("{failure}");
        }
    }

    let s = &report.summary;
    println!();
    println!(
        "{} units: {} passed, {} failed, {} errored, {} skipped",
        s.total, s.passed, s.failed, s.errored, s.skipped
    );
    println!("Report: {}", report.run_dir.join(vmtest_runner::REPORT_FILE).display());
}
