//! # Telemetry Replay CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Config loading and validation
//! - Batch replay and multiplexed demux runs
//! - Graceful shutdown on Ctrl-C / SIGTERM

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_demux, run_info, run_replay, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry replay CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_replay(args).await,
        Commands::Demux(args) => run_demux(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Install the tracing subscriber; the metrics endpoint is started per command
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
    })
}
