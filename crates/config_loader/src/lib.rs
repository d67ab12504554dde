//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce a `ReplayBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("replay.toml")).unwrap();
//! println!("Source: {:?}", blueprint.source.kind);
//! ```

mod parser;
mod validator;

pub use contracts::ReplayBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ReplayBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ReplayBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already-built blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &ReplayBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize ReplayBlueprint to TOML string
    pub fn to_toml(blueprint: &ReplayBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ReplayBlueprint to JSON string
    pub fn to_json(blueprint: &ReplayBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ReplayBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[source]
kind = "jsonl"
path = "archive/crs-16.jsonl"
time_unit = "seconds"

[replay]
speed = 4.0
replica_id = 1
shard_size = 2

[transform]
gap_fill = true

[transform.resample]
enabled = true
original_hz = 1.0
target_hz = 10.0

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.replay.speed, 4.0);
        assert!(bp.transform.resample.enabled);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.replay.replica_id, bp2.replay.replica_id);
        assert_eq!(bp.sinks.len(), bp2.sinks.len());
        assert_eq!(bp.source.path, bp2.source.path);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.transform.tick_ms, bp2.transform.tick_ms);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[source]
kind = "jsonl"
path = "a.jsonl"

[replay]
queue_capacity = 0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_unknown_extension() {
        let err = ConfigLoader::load_from_path(Path::new("replay.yaml")).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
