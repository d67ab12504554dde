//! Transform error types

use thiserror::Error;

/// Errors raised while building a transform from configuration.
///
/// Applying a transform never fails: samples that cannot be processed are
/// skipped or produce empty output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("gap-fill tick must be a positive number of milliseconds, got {tick_ms}")]
    InvalidTick { tick_ms: f64 },

    #[error("gap-fill sample limit must be at least 1")]
    InvalidFillLimit,

    #[error("resample frequencies must be positive, got original={original_hz} Hz target={target_hz} Hz")]
    InvalidFrequency { original_hz: f64, target_hz: f64 },
}
