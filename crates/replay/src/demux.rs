//! Per-key demultiplexing scheduler.
//!
//! Splits one multiplexed `(key, sample)` stream into independent lanes.
//! Each lane is a bounded queue plus a tokio task that applies the key's
//! transform chain and paces with a [`ChainPacer`]. Lanes are created on
//! the first sample of a key and live until their close sentinel.
//!
//! Live lanes are capped at `max_active_keys`. A new key arriving at the cap
//! retires the least recently routed lane (sentinel + join) before opening
//! its own, so routing never waits on a permit no one will release.
//!
//! The [`KeyRegistry`] is the only state shared across keys. Its lock is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{Publisher, Sample, SinkRecord, StreamKey};
use observability::{record_active_lanes, record_queue_depth};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use transform::ChainFactory;

use crate::{
    bounded_queue, run_lane, ChainPacer, LaneReport, QueueSender, ReplayError, Result,
    SampleEmitter, DEFAULT_QUEUE_CAPACITY,
};

/// Default upper bound on simultaneously live lanes
pub const DEFAULT_MAX_ACTIVE_KEYS: usize = 1024;

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemuxConfig {
    /// Bounded queue capacity per key
    pub queue_capacity: usize,
    /// Live lane limit; a new key past it retires the least recently routed lane
    pub max_active_keys: usize,
    /// Playback speed multiplier
    pub speed: f64,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_active_keys: DEFAULT_MAX_ACTIVE_KEYS,
            speed: 1.0,
        }
    }
}

/// One live key: producer half of its queue and the routine consuming it
#[derive(Debug)]
struct KeyLane {
    sender: QueueSender,
    handle: JoinHandle<LaneReport>,
    last_routed: u64,
}

/// Synchronized key -> lane map with insert-if-absent semantics
#[derive(Debug)]
pub struct KeyRegistry {
    lanes: Mutex<HashMap<StreamKey, KeyLane>>,
    permits: Arc<Semaphore>,
    clock: AtomicU64,
}

impl KeyRegistry {
    pub fn new(max_active_keys: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_active_keys.max(1))),
            clock: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StreamKey, KeyLane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Sender of a live lane, marking it as just routed
    fn sender(&self, key: &StreamKey) -> Option<QueueSender> {
        let tick = self.tick();
        self.lock().get_mut(key).map(|lane| {
            lane.last_routed = tick;
            lane.sender.clone()
        })
    }

    /// Insert unless present; returns the winning sender and, when the
    /// candidate lost the race, the candidate back
    fn insert_if_absent(&self, key: StreamKey, mut lane: KeyLane) -> (QueueSender, Option<KeyLane>) {
        lane.last_routed = self.tick();
        let mut lanes = self.lock();
        if let Some(existing) = lanes.get(&key) {
            return (existing.sender.clone(), Some(lane));
        }
        let sender = lane.sender.clone();
        lanes.insert(key, lane);
        record_active_lanes(lanes.len());
        (sender, None)
    }

    fn remove(&self, key: &StreamKey) -> Option<KeyLane> {
        let mut lanes = self.lock();
        let lane = lanes.remove(key);
        record_active_lanes(lanes.len());
        lane
    }

    /// Remove the least recently routed lane
    fn remove_idlest(&self) -> Option<KeyLane> {
        let mut lanes = self.lock();
        let key = lanes
            .iter()
            .min_by_key(|(_, lane)| lane.last_routed)
            .map(|(key, _)| key.clone())?;
        let lane = lanes.remove(&key);
        record_active_lanes(lanes.len());
        lane
    }

    fn drain(&self) -> Vec<KeyLane> {
        let mut lanes = self.lock();
        let drained = lanes.drain().map(|(_, lane)| lane).collect();
        record_active_lanes(0);
        drained
    }

    /// Number of live lanes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Keys with a live lane, sorted
    pub fn keys(&self) -> Vec<StreamKey> {
        let mut keys: Vec<StreamKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Result of a full scheduler run
#[derive(Debug, Default)]
pub struct DemuxReport {
    /// Samples accepted into a lane
    pub routed: u64,
    /// Samples dropped because their lane had stopped
    pub dropped: u64,
    /// Lanes retired to make room for new keys
    pub evicted: u64,
    /// One report per lane; a key retired and reopened appears once per lane
    pub lanes: Vec<LaneReport>,
}

impl DemuxReport {
    pub fn published(&self) -> u64 {
        self.lanes.iter().map(|lane| lane.published).sum()
    }
}

/// Demultiplexing scheduler
pub struct DemuxScheduler<P> {
    registry: KeyRegistry,
    retired: Mutex<Vec<LaneReport>>,
    publisher: Arc<P>,
    factory: ChainFactory,
    config: DemuxConfig,
    cancel: CancellationToken,
}

impl<P> DemuxScheduler<P>
where
    P: Publisher + Send + Sync + 'static,
{
    pub fn new(
        publisher: Arc<P>,
        factory: ChainFactory,
        config: DemuxConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry: KeyRegistry::new(config.max_active_keys),
            retired: Mutex::new(Vec::new()),
            publisher,
            factory,
            config,
            cancel,
        }
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Route one sample to its key's lane, creating the lane on first sight.
    ///
    /// Waits while the lane queue is full. A new key at the live lane limit
    /// first retires the least recently routed lane.
    pub async fn push(&self, key: StreamKey, sample: Sample) -> Result<()> {
        let sender = match self.registry.sender(&key) {
            Some(sender) => sender,
            None => self.open_lane(key).await?,
        };

        let put = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ReplayError::Cancelled),
            put = sender.put(sample) => put,
        };
        put?;
        record_queue_depth(sender.key(), sender.len());
        Ok(())
    }

    async fn open_lane(&self, key: StreamKey) -> Result<QueueSender> {
        let permit = self.acquire_lane_permit().await?;
        let lane = self.spawn_lane(key.clone(), permit);
        let (sender, lost) = self.registry.insert_if_absent(key.clone(), lane);
        match lost {
            Some(candidate) => {
                // another producer created the lane first
                candidate.handle.abort();
            }
            None => debug!(key = %key, "lane opened"),
        }
        Ok(sender)
    }

    async fn acquire_lane_permit(&self) -> Result<OwnedSemaphorePermit> {
        loop {
            match Arc::clone(&self.registry.permits).try_acquire_owned() {
                Ok(permit) => return Ok(permit),
                // the semaphore is never closed
                Err(TryAcquireError::Closed) => return Err(ReplayError::Cancelled),
                Err(TryAcquireError::NoPermits) => {}
            }

            match self.registry.remove_idlest() {
                Some(lane) => {
                    let key = lane.sender.key().clone();
                    warn!(key = %key, "lane limit reached, retiring idlest lane");
                    let report = close_and_join(lane).await;
                    self.retire(report);
                }
                None => {
                    // every permit belongs to a lane another caller is closing
                    let acquired = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ReplayError::Cancelled),
                        acquired = Arc::clone(&self.registry.permits).acquire_owned() => acquired,
                    };
                    return acquired.map_err(|_| ReplayError::Cancelled);
                }
            }
        }
    }

    fn retire(&self, report: LaneReport) {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }

    fn take_retired(&self) -> Vec<LaneReport> {
        std::mem::take(&mut *self.retired.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn spawn_lane(&self, key: StreamKey, permit: OwnedSemaphorePermit) -> KeyLane {
        let (sender, receiver) = bounded_queue(key.clone(), self.config.queue_capacity);
        let pacer = ChainPacer::new(key.clone(), self.config.speed, self.cancel.clone());
        let emitter = SampleEmitter::new(
            key,
            self.factory.build(),
            Arc::clone(&self.publisher),
            self.cancel.clone(),
        );
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let report = run_lane(receiver, pacer, emitter, cancel).await;
            drop(permit);
            report
        });
        KeyLane {
            sender,
            handle,
            last_routed: 0,
        }
    }

    /// Close one key: sentinel behind its pending samples, then join.
    ///
    /// `None` when the key has no live lane.
    pub async fn close_key(&self, key: &StreamKey) -> Option<LaneReport> {
        let lane = self.registry.remove(key)?;
        Some(close_and_join(lane).await)
    }

    /// Consume a multiplexed channel until it ends or cancellation, then shut down
    #[instrument(name = "demux_run", skip(self, input))]
    pub async fn run(&self, mut input: mpsc::Receiver<SinkRecord>) -> DemuxReport {
        let mut routed = 0u64;
        let mut dropped = 0u64;

        loop {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                record = input.recv() => record,
            };
            let Some(SinkRecord { key, sample }) = record else {
                break;
            };

            match self.push(key.clone(), sample).await {
                Ok(()) => routed += 1,
                Err(ReplayError::Cancelled) => break,
                Err(e) => {
                    dropped += 1;
                    debug!(key = %key, error = %e, "sample dropped, lane stopped");
                }
            }
        }

        info!(routed, dropped, lanes = self.registry.len(), "input drained");
        let evicted = self.retired_count();
        let lanes = self.shutdown().await;
        DemuxReport {
            routed,
            dropped,
            evicted,
            lanes,
        }
    }

    fn retired_count(&self) -> u64 {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }

    /// Close every lane and join every routine.
    ///
    /// Reports of lanes retired at the lane limit are included.
    #[instrument(name = "demux_shutdown", skip(self))]
    pub async fn shutdown(&self) -> Vec<LaneReport> {
        let lanes = self.registry.drain();
        info!(lanes = lanes.len(), "shutting down lanes");

        let mut reports = self.take_retired();
        for lane in lanes {
            reports.push(close_and_join(lane).await);
        }
        reports.sort_by(|a, b| a.key.cmp(&b.key));
        reports
    }

    /// Cancel every routine (interrupting sleeps), then shut down
    pub async fn abort(&self) -> Vec<LaneReport> {
        self.cancel.cancel();
        self.shutdown().await
    }
}

async fn close_and_join(lane: KeyLane) -> LaneReport {
    let key = lane.sender.key().clone();

    // a lane that already stopped has dropped its receiver
    if let Err(e) = lane.sender.close().await {
        debug!(key = %key, error = %e, "lane already stopped");
    }
    drop(lane.sender);

    match lane.handle.await {
        Ok(report) => report,
        Err(e) => {
            error!(key = %key, error = %e, "lane routine failed");
            LaneReport {
                key,
                received: 0,
                published: 0,
                stats: Default::default(),
                error: Some(ReplayError::Join(e.to_string())),
            }
        }
    }
}

impl<P> std::fmt::Debug for DemuxScheduler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemuxScheduler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl<P> Drop for DemuxScheduler<P> {
    fn drop(&mut self) {
        let lanes = self.registry.drain();
        if !lanes.is_empty() {
            warn!(lanes = lanes.len(), "scheduler dropped with live lanes, aborting");
            for lane in lanes {
                lane.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPublisher;
    use std::time::Duration;
    use tokio::time::Instant;
    use transform::{POSITION_X, VELOCITY_X, VELOCITY_Y};

    fn identity_factory() -> ChainFactory {
        ChainFactory::new(&contracts::TransformConfig {
            integrate: false,
            ..Default::default()
        })
        .unwrap()
    }

    fn scheduler(
        publisher: &Arc<RecordingPublisher>,
        config: DemuxConfig,
    ) -> DemuxScheduler<RecordingPublisher> {
        DemuxScheduler::new(
            publisher.clone(),
            identity_factory(),
            config,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_interleaved_keys_keep_per_key_order() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = scheduler(&publisher, DemuxConfig::default());
        let (tx, rx) = mpsc::channel(16);

        let a = StreamKey::from("a");
        let b = StreamKey::from("b");
        let producer = tokio::spawn({
            let (a, b) = (a.clone(), b.clone());
            async move {
                for i in 0..6 {
                    let t = i as f64 * 50.0;
                    tx.send(SinkRecord::new(a.clone(), Sample::new(t))).await.unwrap();
                    tx.send(SinkRecord::new(b.clone(), Sample::new(t * 2.0)))
                        .await
                        .unwrap();
                }
            }
        });

        let report = demux.run(rx).await;
        producer.await.unwrap();

        assert_eq!(report.routed, 12);
        assert_eq!(report.lanes.len(), 2);
        // first sample of each key only anchors
        assert_eq!(publisher.times(&a), vec![50.0, 100.0, 150.0, 200.0, 250.0]);
        assert_eq!(publisher.times(&b), vec![100.0, 200.0, 300.0, 400.0, 500.0]);
        assert!(demux.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_created_once_per_key() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = scheduler(&publisher, DemuxConfig::default());
        let key = StreamKey::from("k");

        demux.push(key.clone(), Sample::new(0.0)).await.unwrap();
        demux.push(key.clone(), Sample::new(10.0)).await.unwrap();
        assert_eq!(demux.registry().len(), 1);
        assert!(demux.registry().contains(&key));

        let report = demux.close_key(&key).await.unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.published, 1);
        assert!(demux.close_key(&key).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_key_reopens_fresh() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = scheduler(&publisher, DemuxConfig::default());
        let key = StreamKey::from("k");

        demux.push(key.clone(), Sample::new(0.0)).await.unwrap();
        demux.push(key.clone(), Sample::new(10.0)).await.unwrap();
        demux.close_key(&key).await.unwrap();

        demux.push(key.clone(), Sample::new(500.0)).await.unwrap();
        demux.push(key.clone(), Sample::new(510.0)).await.unwrap();
        demux.shutdown().await;

        // new lane re-anchors on 500
        assert_eq!(publisher.times(&key), vec![10.0, 510.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lane_backpressures_push() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = Arc::new(scheduler(
            &publisher,
            DemuxConfig {
                queue_capacity: 1,
                ..Default::default()
            },
        ));
        let key = StreamKey::from("slow");

        // anchor, then a sample one hour later holds the lane in sleep
        demux.push(key.clone(), Sample::new(0.0)).await.unwrap();
        demux.push(key.clone(), Sample::new(3_600_000.0)).await.unwrap();
        tokio::task::yield_now().await;
        demux.push(key.clone(), Sample::new(3_600_001.0)).await.unwrap();

        let blocked = tokio::spawn({
            let demux = Arc::clone(&demux);
            let key = key.clone();
            async move { demux.push(key, Sample::new(3_600_002.0)).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!blocked.is_finished());

        let reports = demux.abort().await;
        assert!(reports[0].is_cancelled());
        assert!(blocked.await.unwrap().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_interrupts_sleeping_lanes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = scheduler(&publisher, DemuxConfig::default());

        for name in ["a", "b", "c"] {
            let key = StreamKey::from(name);
            demux.push(key.clone(), Sample::new(0.0)).await.unwrap();
            demux.push(key, Sample::new(86_400_000.0)).await.unwrap();
        }

        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let reports = demux.abort().await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(LaneReport::is_cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(publisher.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_key_at_lane_limit_retires_idlest_lane() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = scheduler(
            &publisher,
            DemuxConfig {
                max_active_keys: 1,
                ..Default::default()
            },
        );
        let first = StreamKey::from("first");

        demux.push(first.clone(), Sample::new(0.0)).await.unwrap();
        demux.push(first.clone(), Sample::new(10.0)).await.unwrap();
        demux.push("second".into(), Sample::new(0.0)).await.unwrap();

        assert_eq!(demux.registry().keys(), vec![StreamKey::from("second")]);
        // retired lane paced out its pending samples first
        assert_eq!(publisher.times(&first), vec![10.0]);

        let reports = demux.shutdown().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].key, first);
        assert_eq!(reports[0].received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_more_keys_than_lane_limit_completes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = scheduler(
            &publisher,
            DemuxConfig {
                max_active_keys: 2,
                ..Default::default()
            },
        );
        let (tx, rx) = mpsc::channel(16);
        for name in ["a", "b", "c"] {
            for t in [0.0, 100.0] {
                tx.send(SinkRecord::new(name.into(), Sample::new(t))).await.unwrap();
            }
        }
        drop(tx);

        let report = tokio::time::timeout(Duration::from_secs(3600), demux.run(rx))
            .await
            .unwrap();

        assert_eq!(report.routed, 6);
        assert_eq!(report.evicted, 1);
        let keys: Vec<_> = report.lanes.iter().map(|lane| lane.key.to_string()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(report.published(), 3);
        assert!(demux.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_runs_key_transforms() {
        let publisher = Arc::new(RecordingPublisher::default());
        let demux = DemuxScheduler::new(
            publisher.clone(),
            ChainFactory::new(&Default::default()).unwrap(),
            DemuxConfig::default(),
            CancellationToken::new(),
        );
        let key = StreamKey::from("k");
        for (t, vx) in [(0.0, 0.0), (1000.0, 10.0), (2000.0, 10.0)] {
            let sample = Sample::new(t)
                .with_number(VELOCITY_X, vx)
                .with_number(VELOCITY_Y, 0.0);
            demux.push(key.clone(), sample).await.unwrap();
        }
        demux.shutdown().await;

        let out = publisher.per_key().remove(&key).unwrap();
        let xs: Vec<f64> = out.iter().map(|s| s.number(POSITION_X).unwrap()).collect();
        assert_eq!(xs, vec![5.0, 15.0]);
    }
}
