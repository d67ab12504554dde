//! Replay pacing strategies.
//!
//! Two distinct anchoring schemes:
//!
//! - [`OriginPacer`] anchors every delay to the first sample. Rounding
//!   errors do not accumulate, so a whole batch finishes close to its
//!   recorded span. Used for bulk replay of fetched batches.
//! - [`ChainPacer`] anchors each delay to the previously forwarded sample.
//!   It absorbs queueing delay between samples at the cost of accumulating
//!   rounding. Used by the demultiplexing lanes. The first sample only sets
//!   the anchor and is not forwarded.
//!
//! Both scale event time by a speed multiplier and sleep interruptibly.

use std::time::Duration;

use contracts::StreamKey;
use observability::{
    record_pacing_lag_ms, record_pacing_sleep_ms, record_time_regression, PacingStats,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{ReplayError, Result};

/// Reference pair used to compute the next delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacerAnchor {
    /// Event time (ms)
    pub event_time: f64,
    /// Wall clock when that event was handled
    pub wall_clock: Instant,
}

impl PacerAnchor {
    fn now(event_time: f64) -> Self {
        Self {
            event_time,
            wall_clock: Instant::now(),
        }
    }
}

/// Wall-clock duration for `event_ms` of event time at `speed`.
///
/// Negative, NaN and zero spans map to zero.
pub fn scaled_delay(event_ms: f64, speed: f64) -> Duration {
    if event_ms.is_nan() || event_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(event_ms / 1000.0 / speed).unwrap_or(Duration::MAX)
}

/// Shared sleep/regression bookkeeping
#[derive(Debug)]
struct PaceClock {
    key: StreamKey,
    strategy: &'static str,
    speed: f64,
    cancel: CancellationToken,
    last_time: Option<f64>,
    stats: PacingStats,
}

impl PaceClock {
    fn new(key: StreamKey, strategy: &'static str, speed: f64, cancel: CancellationToken) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            warn!(key = %key, speed, "invalid speed multiplier, using 1.0");
            1.0
        };
        Self {
            key,
            strategy,
            speed,
            cancel,
            last_time: None,
            stats: PacingStats::new(),
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReplayError::Cancelled);
        }
        Ok(())
    }

    /// Detect (never fix) out-of-order event times
    fn observe(&mut self, time: f64) {
        if let Some(last) = self.last_time {
            if time < last {
                self.stats.regressions += 1;
                record_time_regression(&self.key, self.strategy);
                warn!(
                    key = %self.key,
                    time,
                    previous = last,
                    strategy = self.strategy,
                    "time regression, emitting without delay"
                );
            }
        }
        self.last_time = Some(time);
    }

    /// Sleep until `anchor + target`, interruptible by cancellation
    async fn sleep_until(&mut self, anchor: Instant, target: Duration) -> Result<()> {
        let deadline = anchor.checked_add(target).unwrap_or_else(far_future);
        let now = Instant::now();

        if deadline <= now {
            let lag_ms = (now - deadline).as_secs_f64() * 1000.0;
            self.stats.lag_ms.push(lag_ms);
            record_pacing_lag_ms(self.strategy, lag_ms);
            return Ok(());
        }

        let sleep_ms = (deadline - now).as_secs_f64() * 1000.0;
        self.stats.sleep_ms.push(sleep_ms);
        record_pacing_sleep_ms(self.strategy, sleep_ms);
        trace!(key = %self.key, delay_ms = sleep_ms, "pacing sleep");

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReplayError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Ok(()),
        }
    }
}

fn far_future() -> Instant {
    // roughly 30 years
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

/// Origin-anchored pacer for one ordered batch
#[derive(Debug)]
pub struct OriginPacer {
    clock: PaceClock,
    origin: Option<PacerAnchor>,
}

impl OriginPacer {
    pub fn new(key: StreamKey, speed: f64, cancel: CancellationToken) -> Self {
        Self {
            clock: PaceClock::new(key, "origin", speed, cancel),
            origin: None,
        }
    }

    /// Wait until the sample stamped `time` (ms) is due.
    ///
    /// The first call anchors and returns immediately. Later calls sleep
    /// `max(0, (time - t0) / speed - elapsed_wall)`.
    pub async fn wait(&mut self, time: f64) -> Result<()> {
        self.clock.check_cancelled()?;
        self.clock.observe(time);

        let Some(origin) = self.origin else {
            self.origin = Some(PacerAnchor::now(time));
            return Ok(());
        };

        let target = scaled_delay(time - origin.event_time, self.clock.speed);
        self.clock.sleep_until(origin.wall_clock, target).await
    }

    pub fn anchor(&self) -> Option<PacerAnchor> {
        self.origin
    }

    pub fn stats(&self) -> &PacingStats {
        &self.clock.stats
    }

    pub fn into_stats(self) -> PacingStats {
        self.clock.stats
    }
}

/// Chain-anchored pacer for one demultiplexed lane
#[derive(Debug)]
pub struct ChainPacer {
    clock: PaceClock,
    anchor: Option<PacerAnchor>,
}

impl ChainPacer {
    pub fn new(key: StreamKey, speed: f64, cancel: CancellationToken) -> Self {
        Self {
            clock: PaceClock::new(key, "chain", speed, cancel),
            anchor: None,
        }
    }

    /// Wait until the sample stamped `time` (ms) may be forwarded.
    ///
    /// Returns `false` for the very first sample: it only records the
    /// anchor and must not be forwarded. Otherwise sleeps
    /// `(time - anchor.event_time) / speed - (now - anchor.wall_clock)` when
    /// positive and returns `true`; call [`ChainPacer::advance`] once the
    /// sample has been forwarded.
    pub async fn admit(&mut self, time: f64) -> Result<bool> {
        self.clock.check_cancelled()?;
        self.clock.observe(time);

        let Some(anchor) = self.anchor else {
            self.anchor = Some(PacerAnchor::now(time));
            return Ok(false);
        };

        let target = scaled_delay(time - anchor.event_time, self.clock.speed);
        self.clock.sleep_until(anchor.wall_clock, target).await?;
        Ok(true)
    }

    /// Move the anchor to a forwarded sample
    pub fn advance(&mut self, time: f64) {
        self.anchor = Some(PacerAnchor::now(time));
    }

    pub fn anchor(&self) -> Option<PacerAnchor> {
        self.anchor
    }

    pub fn stats(&self) -> &PacingStats {
        &self.clock.stats
    }

    pub fn into_stats(self) -> PacingStats {
        self.clock.stats
    }
}
