//! Launch telemetry archive over HTTP.
//!
//! Each mission document carries `mission_id`, `name`, `flight_number` and an
//! `analysed[]` list of stages, each with its own `telemetry[]`. Every stage
//! becomes one key, `"{mission_id}-stage-{stage}"`, and every telemetry entry
//! is enriched with the mission metadata and its stage.
//!
//! A mission that cannot be fetched or decoded during enumeration does not
//! fail the listing. It is listed under its mission id and fetching that key
//! returns the enumeration error, so it shows up as one skipped key.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::{
    FetchError, FieldValue, Sample, SampleSource, SourceConfig, StreamKey, TimeUnit, TIME_FIELD,
};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{audit_monotonic, validate_batch, IngestionError, Result};

/// Placeholder substituted with each mission id
pub const MISSION_PLACEHOLDER: &str = "{mission_id}";

/// Telemetry `time` in the archive is seconds since lift-off
pub const ARCHIVE_TIME_UNIT: TimeUnit = TimeUnit::Seconds;

const USER_AGENT: &str = concat!("telemetry-replay/", env!("CARGO_PKG_VERSION"));

/// One decoded stage of a mission
#[derive(Debug, Clone, PartialEq)]
pub struct StageBatch {
    pub key: StreamKey,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Default)]
struct ArchiveCache {
    /// key -> mission it belongs to
    missions: HashMap<StreamKey, String>,
    /// Batches decoded during enumeration, taken on first fetch
    batches: HashMap<StreamKey, Vec<Sample>>,
    /// Missions that failed enumeration, keyed by mission id
    failed: HashMap<StreamKey, FetchError>,
}

/// HTTP launch archive source
pub struct LaunchArchiveSource {
    client: reqwest::Client,
    url_template: String,
    missions: Vec<String>,
    required_fields: Vec<String>,
    cache: Mutex<ArchiveCache>,
}

impl LaunchArchiveSource {
    pub fn new(
        url_template: impl Into<String>,
        missions: Vec<String>,
        required_fields: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestionError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            missions,
            required_fields,
            cache: Mutex::default(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or(IngestionError::MissingConfig { field: "url" })?;
        if config.missions.is_empty() {
            return Err(IngestionError::MissingConfig { field: "missions" });
        }
        Self::new(
            url,
            config.missions.clone(),
            config.required_fields.clone(),
            Duration::from_secs(config.request_timeout_s),
        )
    }

    /// URL of one mission document
    pub fn mission_url(&self, mission_id: &str) -> String {
        self.url_template.replace(MISSION_PLACEHOLDER, mission_id)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, ArchiveCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(skip(self), fields(url = tracing::field::Empty))]
    async fn fetch_mission(
        &self,
        mission_id: &str,
    ) -> std::result::Result<Vec<StageBatch>, FetchError> {
        let url = self.mission_url(mission_id);
        tracing::Span::current().record("url", url.as_str());

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::transport(mission_id, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                key: mission_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::transport(
                mission_id,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| FetchError::schema_invalid(mission_id, format!("not JSON: {e}")))?;

        let stages = decode_launch(&document, ARCHIVE_TIME_UNIT)
            .map_err(|message| FetchError::schema_invalid(mission_id, message))?;
        debug!(stages = stages.len(), "mission decoded");
        Ok(stages)
    }

    fn remember(&self, mission_id: &str, stages: &[StageBatch]) {
        let mut cache = self.cache();
        for stage in stages {
            cache
                .missions
                .insert(stage.key.clone(), mission_id.to_string());
            cache
                .batches
                .insert(stage.key.clone(), stage.samples.clone());
        }
    }

    fn checked(
        &self,
        key: &StreamKey,
        samples: Vec<Sample>,
    ) -> std::result::Result<Vec<Sample>, FetchError> {
        validate_batch(key, &samples, &self.required_fields)?;
        audit_monotonic(key, &samples);
        Ok(samples)
    }
}

impl SampleSource for LaunchArchiveSource {
    fn name(&self) -> &str {
        "launch_archive"
    }

    /// Fails only when no mission could be enumerated
    async fn list_keys(&self) -> std::result::Result<Vec<StreamKey>, FetchError> {
        let mut keys = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;

        for mission_id in &self.missions {
            match self.fetch_mission(mission_id).await {
                Ok(stages) => {
                    self.remember(mission_id, &stages);
                    keys.extend(stages.into_iter().map(|stage| stage.key));
                }
                Err(e) => {
                    warn!(mission = %mission_id, error = %e, "mission enumeration failed");
                    failures += 1;
                    let key = StreamKey::from(mission_id.as_str());
                    let mut cache = self.cache();
                    cache.missions.insert(key.clone(), mission_id.clone());
                    cache.failed.insert(key.clone(), e.clone());
                    keys.push(key);
                    last_error = Some(e);
                }
            }
        }

        if failures == self.missions.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        info!(
            missions = self.missions.len(),
            failed = failures,
            keys = keys.len(),
            "archive enumerated"
        );
        Ok(keys)
    }

    async fn fetch(&self, key: &StreamKey) -> std::result::Result<Vec<Sample>, FetchError> {
        let (cached, failed, mission_id) = {
            let mut cache = self.cache();
            (
                cache.batches.remove(key),
                cache.failed.remove(key),
                cache.missions.get(key).cloned(),
            )
        };
        if let Some(e) = failed {
            return Err(e);
        }
        if let Some(samples) = cached {
            return self.checked(key, samples);
        }

        let mission_id = mission_id.ok_or_else(|| FetchError::not_found(key))?;
        let stages = self.fetch_mission(&mission_id).await?;
        let samples = stages
            .into_iter()
            .find(|stage| &stage.key == key)
            .map(|stage| stage.samples)
            .ok_or_else(|| FetchError::not_found(key))?;
        self.checked(key, samples)
    }
}

impl std::fmt::Debug for LaunchArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchArchiveSource")
            .field("url_template", &self.url_template)
            .field("missions", &self.missions)
            .finish()
    }
}

/// Decode a launch document (or a list of them) into per-stage batches
pub fn decode_launch(
    document: &Value,
    unit: TimeUnit,
) -> std::result::Result<Vec<StageBatch>, String> {
    match document {
        Value::Array(launches) => {
            let mut stages = Vec::new();
            for launch in launches {
                stages.extend(decode_one(launch, unit)?);
            }
            Ok(stages)
        }
        launch => decode_one(launch, unit),
    }
}

fn decode_one(launch: &Value, unit: TimeUnit) -> std::result::Result<Vec<StageBatch>, String> {
    let launch = launch.as_object().ok_or("launch is not an object")?;
    let mission_id = launch
        .get("mission_id")
        .and_then(Value::as_str)
        .ok_or("missing 'mission_id'")?;
    let metadata: Vec<(&str, FieldValue)> = ["mission_id", "name", "flight_number"]
        .into_iter()
        .filter_map(|name| {
            let value = launch.get(name).and_then(FieldValue::from_json)?;
            Some((name, value))
        })
        .collect();

    let analysed = launch
        .get("analysed")
        .and_then(Value::as_array)
        .ok_or("missing 'analysed' list")?;

    analysed
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let stage = stage
                .as_object()
                .ok_or_else(|| format!("analysed[{index}] is not an object"))?;
            let stage_value = stage
                .get("stage")
                .ok_or_else(|| format!("analysed[{index}] is missing 'stage'"))?;
            let telemetry = stage
                .get("telemetry")
                .and_then(Value::as_array)
                .ok_or_else(|| format!("analysed[{index}] is missing 'telemetry'"))?;

            let stage_field = FieldValue::from_json(stage_value)
                .ok_or_else(|| format!("analysed[{index}].stage is not a scalar"))?;
            let samples = telemetry
                .iter()
                .enumerate()
                .map(|(row, entry)| {
                    let entry = entry
                        .as_object()
                        .ok_or_else(|| format!("telemetry[{row}] is not an object"))?;
                    let mut sample = Sample::from_json_object(entry, TIME_FIELD, unit)
                        .map_err(|e| format!("telemetry[{row}]: {e}"))?;
                    for (name, value) in &metadata {
                        sample.insert(*name, value.clone());
                    }
                    sample.insert("stage", stage_field.clone());
                    Ok(sample)
                })
                .collect::<std::result::Result<Vec<_>, String>>()?;

            Ok(StageBatch {
                key: StreamKey::composite(mission_id, stage_label(stage_value)),
                samples,
            })
        })
        .collect()
}

fn stage_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
