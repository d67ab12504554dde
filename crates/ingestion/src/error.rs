//! Ingestion error types
//!
//! Construction-time failures only. Per-key failures while serving samples
//! are reported as [`contracts::FetchError`].

use std::path::PathBuf;

use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Source configuration lacks a field its kind requires
    #[error("source config is missing '{field}'")]
    MissingConfig { field: &'static str },

    /// Archive file could not be read
    #[error("failed to read archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive line is not a keyed sample
    #[error("invalid archive line {line}: {message}")]
    Decode { line: usize, message: String },

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Multiplexed stream consumer went away
    #[error("record channel closed")]
    ChannelClosed,
}

impl IngestionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
