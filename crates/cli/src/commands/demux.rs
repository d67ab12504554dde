//! `demux` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use super::{cancel_on_shutdown_signal, load_blueprint, start_metrics};
use crate::cli::DemuxArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `demux` command
pub async fn run_demux(args: &DemuxArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config, &args.overrides)?;

    let input = args
        .input
        .clone()
        .or_else(|| blueprint.source.path.clone())
        .ok_or(CliError::MissingInput)?;

    info!(
        input = %input.display(),
        key_field = %blueprint.source.key_field,
        speed = blueprint.replay.speed,
        max_active_keys = blueprint.replay.max_active_keys,
        "Configuration loaded"
    );

    start_metrics(args.metrics_port)?;

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: None,
        buffer_size: args.buffer_size,
        shutdown_grace: Duration::from_secs(args.shutdown_grace),
    });
    cancel_on_shutdown_signal(pipeline.cancel_token());

    let stats = pipeline
        .run_demux(&input)
        .await
        .with_context(|| format!("Demux replay of {} failed", input.display()))?;

    info!(
        keys = stats.keys_total,
        published = stats.published,
        input_dropped = stats.input_dropped,
        cancelled = stats.cancelled,
        "Demux replay finished"
    );
    stats.print_summary();

    Ok(())
}
