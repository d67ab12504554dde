//! Per-key routines.
//!
//! - [`replay_batch`]: origin-paced replay of a fetched batch
//! - [`run_lane`]: chain-paced consumer of one demultiplexed queue
//!
//! Both transform first and pace the transform outputs, so synthetic
//! samples go out at their own timestamps.

use contracts::{Publisher, Sample, StreamKey};
use observability::PacingStats;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ChainPacer, OriginPacer, QueueReceiver, ReplayError, Result, SampleEmitter};

/// Outcome of one key routine
#[derive(Debug)]
pub struct LaneReport {
    pub key: StreamKey,
    /// Samples taken in (before transforms)
    pub received: u64,
    /// Samples accepted by the publisher
    pub published: u64,
    pub stats: PacingStats,
    /// Why the routine stopped early, if it did
    pub error: Option<ReplayError>,
}

impl LaneReport {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(ReplayError::Cancelled))
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    fn finish(
        key: StreamKey,
        received: u64,
        published: u64,
        mut stats: PacingStats,
        result: Result<()>,
    ) -> Self {
        stats.emitted = published;
        let error = result.err();
        match &error {
            None => info!(key = %key, received, published, "key routine finished"),
            Some(ReplayError::Cancelled) => {
                debug!(key = %key, received, published, "key routine cancelled")
            }
            Some(e) => warn!(key = %key, received, published, error = %e, "key routine stopped"),
        }
        Self {
            key,
            received,
            published,
            stats,
            error,
        }
    }
}

/// Replay one ordered batch with origin-anchored pacing
pub async fn replay_batch<P>(
    samples: Vec<Sample>,
    mut pacer: OriginPacer,
    mut emitter: SampleEmitter<P>,
) -> LaneReport
where
    P: Publisher + Send + Sync + 'static,
{
    let key = emitter.key().clone();
    let received = samples.len() as u64;

    let result: Result<()> = async {
        for sample in samples {
            for out in emitter.transform(sample) {
                pacer.wait(out.time).await?;
                emitter.publish(&out).await?;
            }
        }
        Ok(())
    }
    .await;

    LaneReport::finish(
        key,
        received,
        emitter.published(),
        pacer.into_stats(),
        result,
    )
}

/// Consume one lane queue with chain-anchored pacing until the close sentinel
pub async fn run_lane<P>(
    queue: QueueReceiver,
    mut pacer: ChainPacer,
    mut emitter: SampleEmitter<P>,
    cancel: CancellationToken,
) -> LaneReport
where
    P: Publisher + Send + Sync + 'static,
{
    let key = emitter.key().clone();
    let mut received = 0u64;
    debug!(key = %key, "lane started");

    let result: Result<()> = async {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReplayError::Cancelled),
                next = queue.get() => next,
            };
            let Some(sample) = next else {
                return Ok(());
            };
            received += 1;

            for out in emitter.transform(sample) {
                if pacer.admit(out.time).await? {
                    emitter.publish(&out).await?;
                    pacer.advance(out.time);
                }
            }
        }
    }
    .await;

    LaneReport::finish(
        key,
        received,
        emitter.published(),
        pacer.into_stats(),
        result,
    )
}
