//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::ReplayBlueprint;
use std::time::Duration;
use tracing::info;

use super::{cancel_on_shutdown_signal, load_blueprint, start_metrics};
use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_replay(args: &RunArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config, &args.overrides)?;

    info!(
        source = ?blueprint.source.kind,
        speed = blueprint.replay.speed,
        replica_id = blueprint.replay.replica_id,
        shard_size = blueprint.replay.shard_size,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    start_metrics(args.metrics_port)?;

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        shutdown_grace: Duration::from_secs(args.shutdown_grace),
    });
    cancel_on_shutdown_signal(pipeline.cancel_token());

    info!("Starting replay...");
    let stats = pipeline.run_batch().await.context("Replay failed")?;

    info!(
        published = stats.published,
        skipped = stats.skipped.len(),
        cancelled = stats.cancelled,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        "Replay finished"
    );
    stats.print_summary();

    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ReplayBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Source: {:?}", blueprint.source.kind);
    if let Some(ref url) = blueprint.source.url {
        println!("  URL: {}", url);
    }
    if !blueprint.source.missions.is_empty() {
        println!("  Missions: {}", blueprint.source.missions.join(", "));
    }
    if let Some(ref path) = blueprint.source.path {
        println!("  Path: {}", path.display());
    }

    let replay = &blueprint.replay;
    println!("\nReplay:");
    println!("  Speed: {}x", replay.speed);
    println!("  Queue capacity: {}", replay.queue_capacity);
    match replay.concurrency {
        Some(n) => println!("  Concurrency: {}", n),
        None => println!("  Concurrency: one worker per key"),
    }
    if replay.shard_size > 0 {
        println!(
            "  Shard: replica {} of size {}",
            replay.replica_id, replay.shard_size
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?}, {:?})", sink.name, sink.sink_type, sink.overflow);
        }
    }

    println!();
}
