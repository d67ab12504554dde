//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::ReplaySettings;
use std::path::PathBuf;

/// Telemetry Replay - real-time replay of recorded multi-stream telemetry
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-replay",
    author,
    version,
    about = "Keyed telemetry replay engine",
    long_about = "Replays recorded time-series telemetry in real time.\n\n\
                  Fetches per-key sample batches, re-emits each key at its original \n\
                  cadence (optionally sped up), derives position from velocity and \n\
                  fans the result out to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_REPLAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TELEMETRY_REPLAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay every key of the configured source
    Run(RunArgs),

    /// Replay a multiplexed JSONL stream through per-key lanes
    Demux(DemuxArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Replay settings that may be overridden from the command line
#[derive(Args, Debug, Clone, Default)]
pub struct ReplayOverrides {
    /// Index of this instance among cooperating replicas
    #[arg(long, env = "TELEMETRY_REPLAY_REPLICA_ID")]
    pub replica_id: Option<usize>,

    /// Keys per replica (0 = take every key)
    #[arg(long, env = "TELEMETRY_REPLAY_SHARD_SIZE")]
    pub shard_size: Option<usize>,

    /// Playback speed multiplier
    #[arg(long, env = "TELEMETRY_REPLAY_SPEED")]
    pub speed: Option<f64>,

    /// Worker pool size
    #[arg(long, env = "TELEMETRY_REPLAY_CONCURRENCY")]
    pub concurrency: Option<usize>,
}

impl ReplayOverrides {
    /// Overwrite the configured values that were given on the command line
    pub fn apply(&self, settings: &mut ReplaySettings) {
        if let Some(replica_id) = self.replica_id {
            settings.replica_id = replica_id;
        }
        if let Some(shard_size) = self.shard_size {
            settings.shard_size = shard_size;
        }
        if let Some(speed) = self.speed {
            settings.speed = speed;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = Some(concurrency);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replica_id.is_none()
            && self.shard_size.is_none()
            && self.speed.is_none()
            && self.concurrency.is_none()
    }
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "TELEMETRY_REPLAY_CONFIG"
    )]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: ReplayOverrides,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TELEMETRY_REPLAY_TIMEOUT")]
    pub timeout: u64,

    /// Seconds to wait for in-flight work after a shutdown request
    #[arg(long, default_value = "5", env = "TELEMETRY_REPLAY_SHUTDOWN_GRACE")]
    pub shutdown_grace: u64,

    /// Validate configuration and exit without replaying
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size between the replay core and the dispatcher
    #[arg(long, default_value = "100", env = "TELEMETRY_REPLAY_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "TELEMETRY_REPLAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `demux` command
#[derive(Parser, Debug, Clone)]
pub struct DemuxArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "TELEMETRY_REPLAY_CONFIG"
    )]
    pub config: PathBuf,

    /// Multiplexed JSONL input (defaults to `source.path`)
    #[arg(short, long, env = "TELEMETRY_REPLAY_INPUT")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ReplayOverrides,

    /// Seconds to wait for in-flight work after a shutdown request
    #[arg(long, default_value = "5", env = "TELEMETRY_REPLAY_SHUTDOWN_GRACE")]
    pub shutdown_grace: u64,

    /// Channel buffer size for internal queues
    #[arg(long, default_value = "100", env = "TELEMETRY_REPLAY_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "TELEMETRY_REPLAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show transform chain details
    #[arg(long)]
    pub transforms: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
