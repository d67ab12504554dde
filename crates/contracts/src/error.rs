//! Layered error definitions
//!
//! Categorized by source: config / source / sink

use thiserror::Error;

use crate::StreamKey;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sample Errors =====
    /// Sample decode error
    #[error("sample decode error for key '{key}': {message}")]
    SampleDecode { key: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    /// Sink is no longer accepting records
    #[error("sink '{sink_name}' closed")]
    SinkClosed { sink_name: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink closed error
    pub fn sink_closed(sink_name: impl Into<String>) -> Self {
        Self::SinkClosed {
            sink_name: sink_name.into(),
        }
    }
}

/// Per-key fetch failure reported by a [`SampleSource`](crate::SampleSource).
///
/// Always recoverable: the coordinator logs it, skips the key and keeps
/// going with the siblings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Nothing archived under this key
    #[error("no archive found for key '{key}'")]
    NotFound { key: String },

    /// Payload decoded but does not match the expected schema
    #[error("invalid archive for key '{key}': {message}")]
    SchemaInvalid { key: String, message: String },

    /// Network / IO / decode failure while fetching
    #[error("transport error for key '{key}': {message}")]
    Transport { key: String, message: String },
}

impl FetchError {
    pub fn not_found(key: &StreamKey) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    pub fn schema_invalid(key: impl ToString, message: impl Into<String>) -> Self {
        Self::SchemaInvalid {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(key: impl ToString, message: impl Into<String>) -> Self {
        Self::Transport {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Short classification used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::SchemaInvalid { .. } => "schema_invalid",
            Self::Transport { .. } => "transport",
        }
    }
}
