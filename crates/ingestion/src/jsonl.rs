//! JSONL archives: one keyed sample per line.
//!
//! [`JsonlArchiveSource`] groups a whole file by key for batch replay.
//! [`stream_multiplexed`] feeds the same format line by line into a channel,
//! interleaved as written, for the demux scheduler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use contracts::{
    FetchError, Sample, SampleSource, SinkRecord, SourceConfig, StreamKey, TimeUnit, TIME_FIELD,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{audit_monotonic, validate_batch, IngestionError, Result};

/// Line decoding settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormat {
    /// Column holding the stream key
    pub key_field: String,
    /// Unit of the `time` column
    pub time_unit: TimeUnit,
}

impl Default for LineFormat {
    fn default() -> Self {
        Self {
            key_field: "key".to_string(),
            time_unit: TimeUnit::Milliseconds,
        }
    }
}

impl LineFormat {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            key_field: config.key_field.clone(),
            time_unit: config.time_unit,
        }
    }

    /// Decode one line into a keyed record
    pub fn decode(&self, line: &str) -> std::result::Result<SinkRecord, String> {
        let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => return Err("line is not a JSON object".to_string()),
        };
        let key = match object.remove(&self.key_field) {
            Some(Value::String(key)) => StreamKey::from(key),
            Some(_) => return Err(format!("'{}' is not a string", self.key_field)),
            None => return Err(format!("missing '{}' field", self.key_field)),
        };
        let sample = Sample::from_json_object(&object, TIME_FIELD, self.time_unit)?;
        Ok(SinkRecord::new(key, sample))
    }
}

/// Whole-file JSONL source grouped by key
#[derive(Debug)]
pub struct JsonlArchiveSource {
    path: PathBuf,
    order: Vec<StreamKey>,
    batches: HashMap<StreamKey, Vec<Sample>>,
    required_fields: Vec<String>,
}

impl JsonlArchiveSource {
    /// Read and group the file; any malformed line fails the load
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(
        path: impl AsRef<Path>,
        format: &LineFormat,
        required_fields: Vec<String>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| IngestionError::io(&path, e))?;

        let mut order = Vec::new();
        let mut batches: HashMap<StreamKey, Vec<Sample>> = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = format.decode(line).map_err(|message| IngestionError::Decode {
                line: index + 1,
                message,
            })?;
            let batch = batches.entry(record.key.clone()).or_insert_with(|| {
                order.push(record.key.clone());
                Vec::new()
            });
            batch.push(record.sample);
        }

        info!(keys = order.len(), "jsonl archive loaded");
        Ok(Self {
            path,
            order,
            batches,
            required_fields,
        })
    }

    pub async fn from_config(config: &SourceConfig) -> Result<Self> {
        let path = config
            .path
            .as_ref()
            .ok_or(IngestionError::MissingConfig { field: "path" })?;
        Self::open(
            path,
            &LineFormat::from_config(config),
            config.required_fields.clone(),
        )
        .await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSource for JsonlArchiveSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn list_keys(&self) -> std::result::Result<Vec<StreamKey>, FetchError> {
        Ok(self.order.clone())
    }

    async fn fetch(&self, key: &StreamKey) -> std::result::Result<Vec<Sample>, FetchError> {
        let samples = self
            .batches
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::not_found(key))?;
        validate_batch(key, &samples, &self.required_fields)?;
        audit_monotonic(key, &samples);
        Ok(samples)
    }
}

/// Totals of one multiplexed read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub forwarded: u64,
    /// Malformed lines skipped
    pub rejected: u64,
}

/// Forward every line of `path` as a record, in file order.
///
/// Malformed lines are logged and skipped. Waits while `tx` is full; returns
/// early on cancellation.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn stream_multiplexed(
    path: impl AsRef<Path>,
    format: &LineFormat,
    tx: mpsc::Sender<SinkRecord>,
    cancel: CancellationToken,
) -> Result<StreamSummary> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| IngestionError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();
    let mut summary = StreamSummary::default();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(line = line_no, "multiplexed read cancelled");
                break;
            }
            line = lines.next_line() => line.map_err(|e| IngestionError::io(path, e))?,
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        match format.decode(&line) {
            Ok(record) => {
                // a cancelled consumer may drop its receiver while we wait here
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(line = line_no, "multiplexed read cancelled");
                        break;
                    }
                    sent = tx.send(record) => sent,
                };
                sent.map_err(|_| IngestionError::ChannelClosed)?;
                summary.forwarded += 1;
            }
            Err(message) => {
                warn!(line = line_no, error = %message, "skipping malformed line");
                summary.rejected += 1;
            }
        }
    }

    info!(
        forwarded = summary.forwarded,
        rejected = summary.rejected,
        "multiplexed read finished"
    );
    Ok(summary)
}
