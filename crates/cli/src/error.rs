//! Error types for CLI operations.

use dispatcher::DispatcherError;
use ingestion::IngestionError;
use replay::ReplayError;
use thiserror::Error;
use transform::TransformError;

/// Failures while assembling or running a replay
#[derive(Error, Debug)]
pub enum CliError {
    /// Sample source could not be opened
    #[error("Failed to open sample source: {0}")]
    Source(#[from] IngestionError),

    /// Transform settings rejected
    #[error("Invalid transform configuration: {0}")]
    Transform(#[from] TransformError),

    /// Sinks could not be created
    #[error("Failed to create dispatcher: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// Fatal replay failure
    #[error("Replay failed: {0}")]
    Replay(#[from] ReplayError),

    /// Demux input missing from both the command line and the config
    #[error("No multiplexed input: pass --input or set source.path")]
    MissingInput,

    /// Background task did not finish cleanly
    #[error("Error during shutdown: {message}")]
    Shutdown { message: String },
}

impl CliError {
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
