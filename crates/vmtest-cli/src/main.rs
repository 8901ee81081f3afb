//! vmtest - installer VM integration test harness.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vmtest_runner::{HarnessConfig, LogFormat};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HarnessConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => HarnessConfig::load().context("failed to load configuration")?,
    };
    config.validate()?;

    init_logging(&config, cli.debug);

    let ok = match cli.command {
        Commands::List(args) => commands::list::execute(args, &config, cli.format)?,
        Commands::Show(args) => commands::show::execute(args, &config, cli.format)?,
        Commands::Run(args) => commands::run::execute(args, config, cli.format).await?,
        Commands::Verify(args) => commands::verify::execute(args, &config, cli.format)?,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_logging(config: &HarnessConfig, debug: bool) {
    let level = if debug { "debug" } else { config.logging.level.as_str() };
    let default = format!("vmtest={level},vmtest_core={level},vmtest_runner={level}");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}
