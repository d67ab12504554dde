//! ReplayBlueprint - Config Loader output
//!
//! Describes one complete replay run: where samples come from, how they are
//! paced and sharded, which transforms run per key, and where output goes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::TimeUnit;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Sample source
    pub source: SourceConfig,

    /// Pacing, queueing and sharding
    #[serde(default)]
    pub replay: ReplaySettings,

    /// Per-key transform chain
    #[serde(default)]
    pub transform: TransformConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Sample source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Launch telemetry archive over HTTP
    LaunchArchive,
    /// Local JSONL file, one keyed sample per line
    Jsonl,
}

/// Sample source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// URL template with a `{mission_id}` placeholder (launch_archive)
    #[serde(default)]
    pub url: Option<String>,

    /// Missions to enumerate (launch_archive)
    #[serde(default)]
    pub missions: Vec<String>,

    /// Archive path (jsonl)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Column holding the stream key (jsonl)
    #[serde(default = "default_key_field")]
    pub key_field: String,

    /// Unit of the archived `time` column
    #[serde(default)]
    pub time_unit: TimeUnit,

    /// Columns every sample must carry
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,

    /// HTTP request timeout in seconds (launch_archive)
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
}

fn default_key_field() -> String {
    "key".to_string()
}

fn default_required_fields() -> Vec<String> {
    vec!["velocity".to_string(), "altitude".to_string()]
}

fn default_request_timeout_s() -> u64 {
    30
}

/// Pacing, queueing and sharding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// Playback speed multiplier (1.0 = original cadence)
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Bounded queue capacity per key
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Worker pool size (None = number of assigned keys)
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Upper bound on simultaneously live demux lanes
    #[serde(default = "default_max_active_keys")]
    pub max_active_keys: usize,

    /// Index of this instance among cooperating replicas
    #[serde(default)]
    pub replica_id: usize,

    /// Keys per replica (0 = this instance takes every key)
    #[serde(default)]
    pub shard_size: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            queue_capacity: default_queue_capacity(),
            concurrency: None,
            max_active_keys: default_max_active_keys(),
            replica_id: 0,
            shard_size: 0,
        }
    }
}

fn default_speed() -> f64 {
    1.0
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_active_keys() -> usize {
    1024
}

/// Fallback pool size when neither a configured value nor a key count is known
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Per-key transform chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Derive X/Y position from velocity
    #[serde(default = "default_true")]
    pub integrate: bool,

    /// Expand gaps into synthetic samples
    #[serde(default)]
    pub gap_fill: bool,

    /// Gap-fill tick resolution (milliseconds)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: f64,

    /// Stamp synthetic samples with their own interpolated time
    #[serde(default = "default_true")]
    pub interpolate_time: bool,

    /// Upper bound on synthetic samples generated for a single gap
    #[serde(default = "default_max_fill_samples")]
    pub max_fill_samples: usize,

    /// Batch resampling before pacing
    #[serde(default)]
    pub resample: ResampleConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            integrate: true,
            gap_fill: false,
            tick_ms: default_tick_ms(),
            interpolate_time: true,
            max_fill_samples: default_max_fill_samples(),
            resample: ResampleConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tick_ms() -> f64 {
    100.0
}

fn default_max_fill_samples() -> usize {
    10_000
}

/// Batch resampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Declared cadence of the archive (Hz)
    #[serde(default = "default_original_hz")]
    pub original_hz: f64,

    /// Output cadence (Hz)
    #[serde(default = "default_target_hz")]
    pub target_hz: f64,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            original_hz: default_original_hz(),
            target_hz: default_target_hz(),
        }
    }
}

fn default_original_hz() -> f64 {
    1.0
}

fn default_target_hz() -> f64 {
    10.0
}

/// Behavior when a sink queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for room (backpressure, lossless)
    #[default]
    Block,
    /// Drop the incoming record
    DropNewest,
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Full-queue behavior
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSONL file per key
    File,
    /// UDP datagrams
    Network,
}

impl ReplaySettings {
    /// Pool size for `assigned` keys
    pub fn effective_concurrency(&self, assigned: usize) -> usize {
        match self.concurrency {
            Some(n) if n > 0 => n,
            _ if assigned > 0 => assigned,
            _ => DEFAULT_CONCURRENCY,
        }
    }
}
