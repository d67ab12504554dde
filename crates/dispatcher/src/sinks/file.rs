//! FileSink - appends records to one JSONL file per key

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, DataSink, SinkRecord, StreamKey};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Sink writing `<base_path>/<key>.jsonl`
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writers: HashMap<StreamKey, BufWriter<File>>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            writers: HashMap::new(),
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    /// File a key is written to
    pub fn path_for(&self, key: &StreamKey) -> PathBuf {
        key_path(&self.config.base_path, key)
    }

    fn writer(&mut self, key: &StreamKey) -> std::io::Result<&mut BufWriter<File>> {
        match self.writers.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = key_path(&self.config.base_path, key);
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                debug!(sink = %self.name, path = %path.display(), "opened key file");
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }

    fn append(&mut self, record: &SinkRecord) -> std::io::Result<()> {
        let writer = self.writer(&record.key)?;
        serde_json::to_writer(&mut *writer, &record.sample)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")
    }

    fn flush_all(&mut self) -> std::io::Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn io_error(&self, e: std::io::Error) -> ContractError {
        error!(sink = %self.name, error = %e, "file sink I/O failed");
        ContractError::sink_write(&self.name, e.to_string())
    }
}

/// Keys may contain spaces or separators; keep the file name portable
fn key_path(base: &Path, key: &StreamKey) -> PathBuf {
    let stem: String = key
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    base.join(format!("{stem}.jsonl"))
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, record),
        fields(sink = %self.name, key = %record.key)
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        self.append(record).map_err(|e| self.io_error(e))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_all().map_err(|e| self.io_error(e))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush_all().map_err(|e| self.io_error(e))?;
        let files = self.writers.len();
        self.writers.clear();
        debug!(sink = %self.name, files, "FileSink closed");
        Ok(())
    }
}
