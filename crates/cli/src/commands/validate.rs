//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ReplayBlueprint, SinkType, SourceKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    source_kind: String,
    speed: f64,
    transform_stages: Vec<&'static str>,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    let loaded = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(|e| e.to_string())
        .and_then(|blueprint| {
            // transform settings are only checked when the chain is built
            let factory =
                transform::ChainFactory::new(&blueprint.transform).map_err(|e| e.to_string())?;
            Ok((blueprint, factory))
        });

    match loaded {
        Ok((blueprint, factory)) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    source_kind: format!("{:?}", blueprint.source.kind),
                    speed: blueprint.replay.speed,
                    transform_stages: factory.build().stage_names(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(error) => ValidationResult {
            valid: false,
            config_path,
            error: Some(error),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ReplayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - replayed samples will be discarded".to_string());
    }

    if blueprint.source.kind == SourceKind::LaunchArchive
        && blueprint.source.time_unit != contracts::TimeUnit::default()
    {
        warnings.push(
            "source.time_unit is ignored for launch_archive (archive time is in seconds)"
                .to_string(),
        );
    }

    if blueprint.source.required_fields.is_empty() {
        warnings.push("source.required_fields is empty - batches are not checked".to_string());
    }

    let has_visualization = blueprint.sinks.iter().any(|sink| {
        sink.sink_type == SinkType::Network
            && sink.params.get("format").map(String::as_str) == Some("visualization")
    });
    if has_visualization && !blueprint.transform.integrate {
        warnings.push(
            "visualization sink without transform.integrate - frames lacking X/Y are skipped"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Source: {}", summary.source_kind);
            println!("  Speed: {}x", summary.speed);
            println!("  Transforms: {}", summary.transform_stages.join(" -> "));
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = write_config(
            r#"
            [source]
            kind = "launch_archive"
            url = "https://archive.example/{mission_id}"
            missions = ["crs-16"]
            time_unit = "seconds"
            "#,
        );
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });

        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No sinks")));
        assert!(warnings.iter().any(|w| w.contains("time_unit")));
        assert_eq!(result.summary.unwrap().transform_stages, vec!["integrate"]);
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_config(&ValidateArgs {
            config: "/nonexistent/replay.toml".into(),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_bad_speed_is_invalid() {
        let file = write_config(
            r#"
            [source]
            kind = "jsonl"
            path = "mux.jsonl"

            [replay]
            speed = 0.0
            "#,
        );
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });
        assert!(!result.valid);
    }
}
