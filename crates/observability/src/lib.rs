//! # Observability
//!
//! Tracing + Prometheus metrics for the replay engine.
//!
//! ## Features
//!
//! - Tracing initialization (JSON/Pretty/Compact)
//! - Prometheus metrics export
//! - Pacing statistics and end-of-run summaries
//!
//! ## Example
//!
//! ```ignore
//! use observability::{init, metrics};
//!
//! observability::init()?;
//!
//! metrics::record_sample_published("crs-16-stage-1");
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-exports
pub use crate::metrics::{
    record_active_lanes, record_fetch_failure, record_pacing_lag_ms, record_pacing_sleep_ms,
    record_queue_depth, record_record_dispatched, record_sample_published, record_time_regression,
    MetricsSummary, PacingStats, ReplayMetricsAggregator, RunningStats, StatsSummary,
};

/// Initialize observability with defaults (JSON logs, no metrics endpoint)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Default log level, overridden by RUST_LOG
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON
    #[default]
    Json,
    /// Human readable
    Pretty,
    /// Single-line compact
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initialize with a custom configuration
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    installed.context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install only the Prometheus recorder
///
/// For callers that set up tracing themselves.
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
