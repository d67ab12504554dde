//! Transform-and-publish step shared by every key routine.

use std::sync::Arc;

use contracts::{Publisher, Sample, StreamKey};
use observability::record_sample_published;
use tokio_util::sync::CancellationToken;
use transform::TransformChain;

use crate::{ReplayError, Result};

/// Owns one key's transform chain and its handle to the publisher
pub struct SampleEmitter<P> {
    key: StreamKey,
    chain: TransformChain,
    publisher: Arc<P>,
    cancel: CancellationToken,
    published: u64,
}

impl<P> SampleEmitter<P>
where
    P: Publisher + Send + Sync + 'static,
{
    pub fn new(
        key: StreamKey,
        chain: TransformChain,
        publisher: Arc<P>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key,
            chain,
            publisher,
            cancel,
            published: 0,
        }
    }

    /// Run the chain over one input; zero or more outputs, in order
    pub fn transform(&mut self, sample: Sample) -> Vec<Sample> {
        self.chain.apply(sample)
    }

    /// Hand one sample to the publisher.
    ///
    /// A publisher stalled by backpressure is abandoned on cancellation.
    pub async fn publish(&mut self, sample: &Sample) -> Result<()> {
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ReplayError::Cancelled),
            outcome = self.publisher.publish(&self.key, sample) => outcome,
        };
        outcome.map_err(|error| ReplayError::Publish {
            key: self.key.to_string(),
            error,
        })?;

        self.published += 1;
        record_sample_published(&self.key);
        Ok(())
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Samples accepted by the publisher so far
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl<P> std::fmt::Debug for SampleEmitter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleEmitter")
            .field("key", &self.key)
            .field("chain", &self.chain)
            .field("published", &self.published)
            .finish()
    }
}
