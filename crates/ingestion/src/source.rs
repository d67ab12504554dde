//! Source selection from configuration.

use contracts::{FetchError, Sample, SampleSource, SourceConfig, SourceKind, StreamKey};
use tracing::info;

use crate::{JsonlArchiveSource, LaunchArchiveSource, MockSampleSource, Result};

/// Any configured source
#[derive(Debug)]
pub enum ConfiguredSource {
    LaunchArchive(LaunchArchiveSource),
    Jsonl(JsonlArchiveSource),
    Mock(MockSampleSource),
}

impl ConfiguredSource {
    /// Build the source described by `config`
    pub async fn from_config(config: &SourceConfig) -> Result<Self> {
        let source = match config.kind {
            SourceKind::LaunchArchive => {
                Self::LaunchArchive(LaunchArchiveSource::from_config(config)?)
            }
            SourceKind::Jsonl => Self::Jsonl(JsonlArchiveSource::from_config(config).await?),
        };
        info!(source = source.name(), "sample source ready");
        Ok(source)
    }
}

impl From<MockSampleSource> for ConfiguredSource {
    fn from(source: MockSampleSource) -> Self {
        Self::Mock(source)
    }
}

impl SampleSource for ConfiguredSource {
    fn name(&self) -> &str {
        match self {
            Self::LaunchArchive(s) => s.name(),
            Self::Jsonl(s) => s.name(),
            Self::Mock(s) => s.name(),
        }
    }

    async fn list_keys(&self) -> std::result::Result<Vec<StreamKey>, FetchError> {
        match self {
            Self::LaunchArchive(s) => s.list_keys().await,
            Self::Jsonl(s) => s.list_keys().await,
            Self::Mock(s) => s.list_keys().await,
        }
    }

    async fn fetch(&self, key: &StreamKey) -> std::result::Result<Vec<Sample>, FetchError> {
        match self {
            Self::LaunchArchive(s) => s.fetch(key).await,
            Self::Jsonl(s) => s.fetch(key).await,
            Self::Mock(s) => s.fetch(key).await,
        }
    }
}
