//! Concurrency coordinator.
//!
//! Enumerates the source's keys, keeps this replica's shard, and runs one
//! pool job per key: fetch, optional resample, then origin-paced replay
//! through the key's transform chain into the publisher.
//!
//! The pool is a `JoinSet` bounded by a semaphore. Fetch and replay of a key
//! share one job, so no job ever waits on another job of the same pool.

use std::sync::Arc;

use contracts::{
    FetchError, Publisher, ReplaySettings, Sample, SampleSource, StreamKey,
};
use observability::{record_fetch_failure, ReplayMetricsAggregator};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use transform::ChainFactory;

use crate::{
    replay_batch, LaneReport, OriginPacer, ReplayError, Result, SampleEmitter, ShardAssignment,
};

/// Coordinator settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Playback speed multiplier
    pub speed: f64,
    /// Pool size; `None` sizes the pool to the assigned key count
    pub concurrency: Option<usize>,
    pub shard: ShardAssignment,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            concurrency: None,
            shard: ShardAssignment::all(),
        }
    }
}

impl From<&ReplaySettings> for CoordinatorConfig {
    fn from(settings: &ReplaySettings) -> Self {
        Self {
            speed: settings.speed,
            concurrency: settings.concurrency,
            shard: ShardAssignment::new(settings.replica_id, settings.shard_size),
        }
    }
}

impl CoordinatorConfig {
    /// Configured size, else one slot per assigned key, else the fixed default
    pub fn pool_size(&self, assigned: usize) -> usize {
        ReplaySettings {
            concurrency: self.concurrency,
            ..Default::default()
        }
        .effective_concurrency(assigned)
    }
}

/// How one key ended
#[derive(Debug)]
enum KeyOutcome {
    Replayed(LaneReport),
    FetchFailed(StreamKey, FetchError),
    Cancelled(StreamKey),
}

/// Summary of a coordinator run
#[derive(Debug, Default)]
pub struct CoordinatorReport {
    /// Keys listed by the source
    pub total_keys: usize,
    /// Keys in this replica's shard
    pub assigned: usize,
    /// Keys replayed to the end
    pub completed: usize,
    /// Keys given up on, with the reason
    pub skipped: Vec<(StreamKey, String)>,
    /// Samples accepted by the publisher
    pub published: u64,
    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
    pub metrics: ReplayMetricsAggregator,
}

/// Fans key replays out over a bounded pool
pub struct Coordinator<S, P> {
    source: Arc<S>,
    publisher: Arc<P>,
    factory: ChainFactory,
    config: CoordinatorConfig,
    cancel: CancellationToken,
}

impl<S, P> Coordinator<S, P>
where
    S: SampleSource + Send + Sync + 'static,
    P: Publisher + Send + Sync + 'static,
{
    pub fn new(
        source: Arc<S>,
        publisher: Arc<P>,
        factory: ChainFactory,
        config: CoordinatorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            publisher,
            factory,
            config,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Replay every assigned key.
    ///
    /// Fails only when the source cannot list its keys. Per-key failures
    /// are logged and reported as skipped.
    #[instrument(name = "coordinator_run", skip(self), fields(source = self.source.name()))]
    pub async fn run(&self) -> Result<CoordinatorReport> {
        let keys = self
            .source
            .list_keys()
            .await
            .map_err(|error| ReplayError::KeyEnumeration {
                source_name: self.source.name().to_string(),
                error,
            })?;

        let range = self.config.shard.range(keys.len());
        let assigned = self.config.shard.select(&keys).to_vec();
        let pool_size = self.config.pool_size(assigned.len());
        info!(
            total = keys.len(),
            assigned = assigned.len(),
            shard_start = range.start,
            shard_end = range.end,
            pool_size,
            "replaying shard"
        );

        let mut report = CoordinatorReport {
            total_keys: keys.len(),
            assigned: assigned.len(),
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(pool_size));
        let mut jobs = JoinSet::new();

        for key in assigned {
            let acquired = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    report.skipped.push((key, ReplayError::Cancelled.kind().to_string()));
                    continue;
                }
                acquired = Arc::clone(&permits).acquire_owned() => acquired,
            };
            let Ok(permit) = acquired else {
                break;
            };

            let job = self.key_job(key);
            jobs.spawn(async move {
                let outcome = job.await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(outcome) => Self::record(&mut report, outcome),
                Err(e) => {
                    error!(error = %e, "key job failed to join");
                    report.metrics.record_skipped("join");
                }
            }
        }

        report.cancelled = self.cancel.is_cancelled();
        report.skipped.sort();
        info!(
            completed = report.completed,
            skipped = report.skipped.len(),
            published = report.published,
            cancelled = report.cancelled,
            "shard replay finished"
        );
        Ok(report)
    }

    /// Build the self-contained job for one key
    fn key_job(&self, key: StreamKey) -> impl std::future::Future<Output = KeyOutcome> + Send {
        let source = Arc::clone(&self.source);
        let publisher = Arc::clone(&self.publisher);
        let chain = self.factory.build();
        let resampler = self.factory.resampler().copied();
        let speed = self.config.speed;
        let cancel = self.cancel.clone();

        async move {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return KeyOutcome::Cancelled(key),
                fetched = source.fetch(&key) => fetched,
            };
            let samples: Vec<Sample> = match fetched {
                Ok(samples) => samples,
                Err(e) => return KeyOutcome::FetchFailed(key, e),
            };

            let samples = match resampler {
                Some(resampler) => {
                    let resampled = resampler.resample(&samples);
                    debug!(
                        key = %key,
                        before = samples.len(),
                        after = resampled.len(),
                        "batch resampled"
                    );
                    resampled
                }
                None => samples,
            };

            let pacer = OriginPacer::new(key.clone(), speed, cancel.clone());
            let emitter = SampleEmitter::new(key, chain, publisher, cancel);
            KeyOutcome::Replayed(replay_batch(samples, pacer, emitter).await)
        }
    }

    fn record(report: &mut CoordinatorReport, outcome: KeyOutcome) {
        match outcome {
            KeyOutcome::Replayed(lane) => {
                report.published += lane.published;
                match lane.error {
                    None => {
                        report.completed += 1;
                        report.metrics.record_completed(&lane.stats);
                    }
                    Some(e) => {
                        report.metrics.record_skipped(e.kind());
                        report.skipped.push((lane.key, e.to_string()));
                    }
                }
            }
            KeyOutcome::FetchFailed(key, e) => {
                warn!(key = %key, kind = e.kind(), error = %e, "fetch failed, key skipped");
                record_fetch_failure(e.kind());
                report.metrics.record_skipped(e.kind());
                report.skipped.push((key, e.to_string()));
            }
            KeyOutcome::Cancelled(key) => {
                report.metrics.record_skipped(ReplayError::Cancelled.kind());
                report.skipped.push((key, ReplayError::Cancelled.to_string()));
            }
        }
    }
}

impl<S, P> std::fmt::Debug for Coordinator<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("factory", &self.factory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DEFAULT_CONCURRENCY;
    use crate::testing::RecordingPublisher;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::Instant;

    /// In-memory source with per-key failures
    #[derive(Default)]
    struct StaticSource {
        batches: HashMap<StreamKey, std::result::Result<Vec<Sample>, FetchError>>,
        order: Vec<StreamKey>,
        broken: bool,
    }

    impl StaticSource {
        fn with(mut self, key: &str, batch: std::result::Result<Vec<Sample>, FetchError>) -> Self {
            let key = StreamKey::from(key);
            self.order.push(key.clone());
            self.batches.insert(key, batch);
            self
        }
    }

    impl SampleSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn list_keys(&self) -> std::result::Result<Vec<StreamKey>, FetchError> {
            if self.broken {
                return Err(FetchError::transport("*", "index unavailable"));
            }
            Ok(self.order.clone())
        }

        async fn fetch(&self, key: &StreamKey) -> std::result::Result<Vec<Sample>, FetchError> {
            self.batches
                .get(key)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::not_found(key)))
        }
    }

    fn ramp(count: usize, step_ms: f64) -> Vec<Sample> {
        (0..count).map(|i| Sample::new(i as f64 * step_ms)).collect()
    }

    fn coordinator(
        source: StaticSource,
        publisher: &Arc<RecordingPublisher>,
        config: CoordinatorConfig,
    ) -> Coordinator<StaticSource, RecordingPublisher> {
        let factory = ChainFactory::new(&contracts::TransformConfig {
            integrate: false,
            ..Default::default()
        })
        .unwrap();
        Coordinator::new(
            Arc::new(source),
            publisher.clone(),
            factory,
            config,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_skips_only_that_key() {
        let source = StaticSource::default()
            .with("a", Ok(ramp(3, 100.0)))
            .with("b", Err(FetchError::schema_invalid("b", "missing velocity")))
            .with("c", Ok(ramp(4, 100.0)));
        let publisher = Arc::new(RecordingPublisher::default());

        let report = coordinator(source, &publisher, CoordinatorConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.assigned, 3);
        assert_eq!(report.completed, 2);
        assert_eq!(report.published, 7);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, StreamKey::from("b"));
        assert!(report.skipped[0].1.contains("missing velocity"));
        assert_eq!(report.metrics.skipped.get("schema_invalid"), Some(&1));
    }

    #[tokio::test]
    async fn test_key_enumeration_failure_is_fatal() {
        let source = StaticSource {
            broken: true,
            ..Default::default()
        };
        let publisher = Arc::new(RecordingPublisher::default());
        let err = coordinator(source, &publisher, CoordinatorConfig::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::KeyEnumeration { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_assigned_shard_is_replayed() {
        let mut source = StaticSource::default();
        for name in ["k0", "k1", "k2", "k3", "k4"] {
            source = source.with(name, Ok(ramp(2, 10.0)));
        }
        let publisher = Arc::new(RecordingPublisher::default());
        let config = CoordinatorConfig {
            shard: ShardAssignment::new(1, 2),
            ..Default::default()
        };

        let report = coordinator(source, &publisher, config).run().await.unwrap();
        assert_eq!(report.total_keys, 5);
        assert_eq!(report.assigned, 2);
        let mut keys: Vec<_> = publisher.per_key().into_keys().collect();
        keys.sort();
        assert_eq!(keys, vec![StreamKey::from("k2"), StreamKey::from("k3")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_replay_concurrently() {
        let mut source = StaticSource::default();
        for name in ["a", "b", "c", "d"] {
            source = source.with(name, Ok(ramp(11, 100.0)));
        }
        let publisher = Arc::new(RecordingPublisher::default());

        let start = Instant::now();
        let report = coordinator(source, &publisher, CoordinatorConfig::default())
            .run()
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(report.completed, 4);
        // four one-second keys in parallel, not four seconds back to back
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1100), "elapsed {elapsed:?}");
        for times in publisher.per_key().values() {
            let ts: Vec<f64> = times.iter().map(|s| s.time).collect();
            assert!(ts.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_undersized_pool_serializes_keys() {
        let mut source = StaticSource::default();
        for name in ["a", "b"] {
            source = source.with(name, Ok(ramp(11, 100.0)));
        }
        let publisher = Arc::new(RecordingPublisher::default());
        let config = CoordinatorConfig {
            concurrency: Some(1),
            ..Default::default()
        };

        let start = Instant::now();
        let report = coordinator(source, &publisher, config).run().await.unwrap();
        assert_eq!(report.completed, 2);
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_long_replays() {
        let source = StaticSource::default().with("long", Ok(ramp(2, 3_600_000.0)));
        let publisher = Arc::new(RecordingPublisher::default());
        let coordinator = coordinator(source, &publisher, CoordinatorConfig::default());

        let cancel = coordinator.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let report = coordinator.run().await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
        assert_eq!(report.published, 1);
        assert_eq!(report.skipped[0].1, "replay cancelled");
    }

    #[test]
    fn test_pool_size_fallbacks() {
        let mut config = CoordinatorConfig::default();
        assert_eq!(config.pool_size(7), 7);
        assert_eq!(config.pool_size(0), DEFAULT_CONCURRENCY);
        config.concurrency = Some(3);
        assert_eq!(config.pool_size(7), 3);
    }
}
