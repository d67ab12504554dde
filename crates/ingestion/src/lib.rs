//! # Ingestion
//!
//! Sample sources for the replay engine.
//!
//! Responsibilities:
//! - Fetch archived telemetry per key (HTTP launch archive, JSONL file, mock)
//! - Convert archive timestamps to milliseconds
//! - Reject batches missing required fields
//! - Report time regressions without reordering
//! - Feed multiplexed JSONL streams into a record channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use contracts::SampleSource;
//! use ingestion::ConfiguredSource;
//!
//! let source = ConfiguredSource::from_config(&blueprint.source).await?;
//! for key in source.list_keys().await? {
//!     let samples = source.fetch(&key).await?;
//! }
//! ```

mod error;
mod jsonl;
mod launch_archive;
mod mock;
mod source;
mod validate;

// Re-exports
pub use error::{IngestionError, Result};
pub use jsonl::{stream_multiplexed, JsonlArchiveSource, LineFormat, StreamSummary};
pub use launch_archive::{
    decode_launch, LaunchArchiveSource, StageBatch, ARCHIVE_TIME_UNIT, MISSION_PLACEHOLDER,
};
pub use mock::MockSampleSource;
pub use source::ConfiguredSource;
pub use validate::{audit_monotonic, validate_batch};
