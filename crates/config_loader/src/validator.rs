//! Config validation
//!
//! Rules:
//! - source carries the fields its kind needs
//! - speed > 0, queue_capacity >= 1, max_active_keys >= 1
//! - tick_ms > 0, resample frequencies > 0
//! - sink names non-empty and unique

use std::collections::HashSet;

use contracts::{ContractError, ReplayBlueprint, SourceKind};

/// Validate a ReplayBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &ReplayBlueprint) -> Result<(), ContractError> {
    validate_source(blueprint)?;
    validate_replay(blueprint)?;
    validate_transform(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

fn validate_source(blueprint: &ReplayBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;
    match source.kind {
        SourceKind::LaunchArchive => {
            let url = source.url.as_deref().unwrap_or_default();
            if url.is_empty() {
                return Err(ContractError::config_validation(
                    "source.url",
                    "launch_archive source requires a url",
                ));
            }
            if !url.contains("{mission_id}") {
                return Err(ContractError::config_validation(
                    "source.url",
                    format!("url '{url}' has no {{mission_id}} placeholder"),
                ));
            }
            if source.missions.is_empty() {
                return Err(ContractError::config_validation(
                    "source.missions",
                    "launch_archive source requires at least one mission",
                ));
            }
        }
        SourceKind::Jsonl => {
            if source.path.is_none() {
                return Err(ContractError::config_validation(
                    "source.path",
                    "jsonl source requires a path",
                ));
            }
            if source.key_field.is_empty() {
                return Err(ContractError::config_validation(
                    "source.key_field",
                    "key_field cannot be empty",
                ));
            }
        }
    }
    Ok(())
}

fn validate_replay(blueprint: &ReplayBlueprint) -> Result<(), ContractError> {
    let replay = &blueprint.replay;

    if !replay.speed.is_finite() || replay.speed <= 0.0 {
        return Err(ContractError::config_validation(
            "replay.speed",
            format!("speed must be > 0, got {}", replay.speed),
        ));
    }
    if replay.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "replay.queue_capacity",
            "queue_capacity must be >= 1",
        ));
    }
    if replay.max_active_keys == 0 {
        return Err(ContractError::config_validation(
            "replay.max_active_keys",
            "max_active_keys must be >= 1",
        ));
    }
    Ok(())
}

fn validate_transform(blueprint: &ReplayBlueprint) -> Result<(), ContractError> {
    let transform = &blueprint.transform;

    if !transform.tick_ms.is_finite() || transform.tick_ms <= 0.0 {
        return Err(ContractError::config_validation(
            "transform.tick_ms",
            format!("tick_ms must be > 0, got {}", transform.tick_ms),
        ));
    }

    if transform.max_fill_samples == 0 {
        return Err(ContractError::config_validation(
            "transform.max_fill_samples",
            "max_fill_samples must be >= 1",
        ));
    }

    let resample = &transform.resample;
    if resample.enabled && (resample.original_hz <= 0.0 || resample.target_hz <= 0.0) {
        return Err(ContractError::config_validation(
            "transform.resample",
            format!(
                "frequencies must be > 0, got original_hz={} target_hz={}",
                resample.original_hz, resample.target_hz
            ),
        ));
    }
    Ok(())
}

fn validate_sinks(blueprint: &ReplayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be >= 1",
            ));
        }
    }
    Ok(())
}
