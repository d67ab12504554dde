//! Replay error types

use contracts::{ContractError, FetchError};
use thiserror::Error;

/// Replay engine errors
///
/// Only [`ReplayError::KeyEnumeration`] aborts a run. Everything else is
/// scoped to one key.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Source could not list its keys
    #[error("cannot enumerate keys from source '{source_name}': {error}")]
    KeyEnumeration {
        source_name: String,
        #[source]
        error: FetchError,
    },

    /// Cancellation signal observed
    #[error("replay cancelled")]
    Cancelled,

    /// Queue consumer went away
    #[error("queue for key '{key}' is closed")]
    QueueClosed { key: String },

    /// Downstream publisher rejected a sample
    #[error("publish failed for key '{key}': {error}")]
    Publish {
        key: String,
        #[source]
        error: ContractError,
    },

    /// A key routine panicked or was aborted
    #[error("key routine failed to join: {0}")]
    Join(String),
}

impl ReplayError {
    /// Short classification used in reports and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyEnumeration { .. } => "key_enumeration",
            Self::Cancelled => "cancelled",
            Self::QueueClosed { .. } => "queue_closed",
            Self::Publish { .. } => "publish",
            Self::Join(_) => "join",
        }
    }
}

/// Replay Result type alias
pub type Result<T> = std::result::Result<T, ReplayError>;
