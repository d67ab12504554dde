//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::ReplayBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    source: SourceInfo,
    replay: ReplayInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    transform: Option<TransformInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SourceInfo {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    time_unit: String,
    required_fields: Vec<String>,
}

#[derive(Serialize)]
struct ReplayInfo {
    speed: f64,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency: Option<usize>,
    max_active_keys: usize,
    replica_id: usize,
    shard_size: usize,
}

#[derive(Serialize)]
struct TransformInfo {
    integrate: bool,
    gap_fill: bool,
    tick_ms: f64,
    interpolate_time: bool,
    max_fill_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    resample_hz: Option<(f64, f64)>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    overflow: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &ReplayBlueprint, args: &InfoArgs) -> ConfigInfo {
    let source = &blueprint.source;
    let replay = &blueprint.replay;

    let transform = args.transforms.then(|| {
        let t = &blueprint.transform;
        TransformInfo {
            integrate: t.integrate,
            gap_fill: t.gap_fill,
            tick_ms: t.tick_ms,
            interpolate_time: t.interpolate_time,
            max_fill_samples: t.max_fill_samples,
            resample_hz: t
                .resample
                .enabled
                .then_some((t.resample.original_hz, t.resample.target_hz)),
        }
    });

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                overflow: format!("{:?}", s.overflow),
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        source: SourceInfo {
            kind: format!("{:?}", source.kind),
            url: source.url.clone(),
            missions: source.missions.clone(),
            path: source.path.as_ref().map(|p| p.display().to_string()),
            time_unit: format!("{:?}", source.time_unit),
            required_fields: source.required_fields.clone(),
        },
        replay: ReplayInfo {
            speed: replay.speed,
            queue_capacity: replay.queue_capacity,
            concurrency: replay.concurrency,
            max_active_keys: replay.max_active_keys,
            replica_id: replay.replica_id,
            shard_size: replay.shard_size,
        },
        transform,
        sinks,
    }
}

fn print_config_info(blueprint: &ReplayBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Telemetry Replay Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let source = &blueprint.source;
    println!("📡 Source");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Kind: {:?}", source.kind);
    if let Some(ref url) = source.url {
        println!("   ├─ URL: {}", url);
    }
    if !source.missions.is_empty() {
        println!("   ├─ Missions ({}):", source.missions.len());
        for (i, mission) in source.missions.iter().enumerate() {
            let prefix = if i == source.missions.len() - 1 { "└─" } else { "├─" };
            println!("   │  {} {}", prefix, mission);
        }
    }
    if let Some(ref path) = source.path {
        println!("   ├─ Path: {}", path.display());
    }
    println!("   └─ Required fields: {:?}", source.required_fields);

    let replay = &blueprint.replay;
    println!("\n⏱️  Replay");
    println!("   ├─ Speed: {}x", replay.speed);
    println!("   ├─ Queue capacity: {}", replay.queue_capacity);
    match replay.concurrency {
        Some(n) => println!("   ├─ Concurrency: {}", n),
        None => println!("   ├─ Concurrency: (one worker per key)"),
    }
    println!("   ├─ Max active keys: {}", replay.max_active_keys);
    if replay.shard_size > 0 {
        println!(
            "   └─ Shard: replica {} x {} keys",
            replay.replica_id, replay.shard_size
        );
    } else {
        println!("   └─ Shard: (all keys)");
    }

    if args.transforms {
        let t = &blueprint.transform;
        println!("\n⚙️  Transforms");
        println!("   ├─ Integrate: {}", t.integrate);
        println!(
            "   ├─ Gap fill: {} (tick {} ms, interpolated time: {}, limit {})",
            t.gap_fill, t.tick_ms, t.interpolate_time, t.max_fill_samples
        );
        if t.resample.enabled {
            println!(
                "   └─ Resample: {} Hz -> {} Hz",
                t.resample.original_hz, t.resample.target_hz
            );
        } else {
            println!("   └─ Resample: off");
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let child_prefix = if is_last { "   " } else { "│  " };
            println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);

            if args.sinks {
                println!(
                    "   {}  └─ queue {} ({:?}), params {:?}",
                    child_prefix, sink.queue_capacity, sink.overflow, sink.params
                );
            }
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    const CONFIG: &str = r#"
        [source]
        kind = "jsonl"
        path = "mux.jsonl"

        [transform]
        gap_fill = true

        [[sinks]]
        name = "viz"
        sink_type = "network"
        overflow = "drop_newest"
        params = { addr = "127.0.0.1:9999", format = "visualization" }
    "#;

    #[test]
    fn test_json_info_honors_section_flags() {
        let blueprint = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();

        let brief = build_config_info(
            &blueprint,
            &InfoArgs {
                config: "replay.toml".into(),
                json: true,
                transforms: false,
                sinks: false,
            },
        );
        let value = serde_json::to_value(&brief).unwrap();
        assert!(value.get("transform").is_none());
        assert!(value.get("sinks").is_none());
        assert_eq!(value["source"]["kind"], "Jsonl");

        let full = build_config_info(
            &blueprint,
            &InfoArgs {
                config: "replay.toml".into(),
                json: true,
                transforms: true,
                sinks: true,
            },
        );
        let value = serde_json::to_value(&full).unwrap();
        assert_eq!(value["transform"]["gap_fill"], true);
        assert_eq!(value["sinks"][0]["overflow"], "DropNewest");
    }
}
