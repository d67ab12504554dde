//! Output traits
//!
//! `Publisher` is what the replay core talks to; `DataSink` is what the
//! dispatcher drives for each concrete output.

use crate::{ContractError, Sample, SinkRecord, StreamKey};

/// Core-facing downstream interface
///
/// Contract: one record per call, call order preserved per key, each call
/// submits at most once.
#[trait_variant::make(Publisher: Send)]
pub trait LocalPublisher {
    /// Submit one sample of `key`
    async fn publish(&self, key: &StreamKey, sample: &Sample) -> Result<(), ContractError>;
}

/// Data output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
