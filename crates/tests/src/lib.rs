//! # Integration Tests
//!
//! Cross-crate end-to-end flows.
//!
//! Covers:
//! - Config contract snapshots
//! - Batch replay: mock source -> coordinator -> dispatcher -> file sink
//! - Demux replay: multiplexed stream -> per-key lanes -> publisher

use std::sync::Mutex;

use contracts::{ContractError, Publisher, Sample, StreamKey};

/// Publisher that keeps every call in order
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    records: Mutex<Vec<(StreamKey, Sample)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples published under `key`, in call order
    pub fn samples(&self, key: &StreamKey) -> Vec<Sample> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Publisher for RecordingPublisher {
    async fn publish(&self, key: &StreamKey, sample: &Sample) -> Result<(), ContractError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((key.clone(), sample.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{OverflowPolicy, SinkType, SourceKind, TimeUnit};

    const FULL_CONFIG: &str = r#"
        [source]
        kind = "launch_archive"
        url = "https://archive.example/launches?mission_id={mission_id}"
        missions = ["crs-16", "crs-17"]

        [replay]
        speed = 2.0
        concurrency = 4
        replica_id = 1
        shard_size = 2

        [transform]
        gap_fill = true
        tick_ms = 50.0

        [transform.resample]
        enabled = true
        original_hz = 1.0
        target_hz = 10.0

        [[sinks]]
        name = "viz"
        sink_type = "network"
        overflow = "drop_newest"
        params = { addr = "127.0.0.1:9999", format = "visualization" }

        [[sinks]]
        name = "archive"
        sink_type = "file"
    "#;

    #[test]
    fn test_full_config_snapshot() {
        let bp = ConfigLoader::load_from_str(FULL_CONFIG, ConfigFormat::Toml).unwrap();

        assert_eq!(bp.source.kind, SourceKind::LaunchArchive);
        assert_eq!(bp.source.time_unit, TimeUnit::Milliseconds);
        assert_eq!(bp.source.required_fields, vec!["velocity", "altitude"]);
        assert_eq!(bp.replay.effective_concurrency(2), 4);
        assert_eq!(bp.replay.queue_capacity, 100);
        assert!(bp.transform.integrate);
        assert!(bp.transform.interpolate_time);
        assert_eq!(bp.sinks[0].sink_type, SinkType::Network);
        assert_eq!(bp.sinks[0].overflow, OverflowPolicy::DropNewest);
        assert_eq!(bp.sinks[1].overflow, OverflowPolicy::Block);

        let json = ConfigLoader::to_json(&bp).unwrap();
        let back = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(back.sinks.len(), 2);
        assert_eq!(back.replay.shard_size, 2);
    }

    #[test]
    fn test_duplicate_sink_names_rejected() {
        let config = r#"
            [source]
            kind = "jsonl"
            path = "mux.jsonl"

            [[sinks]]
            name = "out"
            sink_type = "log"

            [[sinks]]
            name = "out"
            sink_type = "file"
        "#;
        assert!(ConfigLoader::load_from_str(config, ConfigFormat::Toml).is_err());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        FetchError, OverflowPolicy, Sample, SinkConfig, SinkRecord, SinkType, StreamKey,
        TransformConfig,
    };
    use dispatcher::{create_dispatcher, publish_channel};
    use ingestion::MockSampleSource;
    use replay::{Coordinator, CoordinatorConfig, DemuxConfig, DemuxScheduler, ShardAssignment};
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;
    use transform::ChainFactory;

    use crate::RecordingPublisher;

    fn file_sink(base_path: &std::path::Path) -> SinkConfig {
        SinkConfig {
            name: "archive".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 16,
            overflow: OverflowPolicy::Block,
            params: HashMap::from([(
                "base_path".to_string(),
                base_path.display().to_string(),
            )]),
        }
    }

    fn read_samples(path: &std::path::Path) -> Vec<Sample> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// MockSampleSource -> Coordinator -> DispatcherPublisher -> FileSink
    #[tokio::test(start_paused = true)]
    async fn test_e2e_batch_replay_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSampleSource::new()
            .with_batch("stage-1", MockSampleSource::ascent(20, 100.0, 90.0))
            .with_batch("stage-2", MockSampleSource::ascent(20, 100.0, 0.0))
            .with_failure("stage-3", FetchError::not_found(&StreamKey::from("stage-3")));

        let (publisher, rx) = publish_channel(8);
        let dispatcher = create_dispatcher(vec![file_sink(dir.path())], rx)
            .await
            .unwrap();
        let dispatch_handle = dispatcher.spawn();

        let coordinator = Coordinator::new(
            Arc::new(source),
            Arc::new(publisher),
            ChainFactory::new(&TransformConfig::default()).unwrap(),
            CoordinatorConfig::default(),
            CancellationToken::new(),
        );

        let started = Instant::now();
        let report = coordinator.run().await.unwrap();
        let elapsed = started.elapsed();
        drop(coordinator);
        let summary = dispatch_handle.await.unwrap();

        // keys replay side by side, each over its 1.9s span
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");

        assert_eq!(report.completed, 2);
        assert_eq!(report.published, 40);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, StreamKey::from("stage-3"));
        assert_eq!(summary.records, 40);
        assert_eq!(summary.dropped(), 0);

        let climb = read_samples(&dir.path().join("stage-1.jsonl"));
        assert_eq!(climb.len(), 20);
        assert!(climb.windows(2).all(|w| w[0].time <= w[1].time));
        let last = climb.last().unwrap();
        // trapezoidal integration of v = 0.01 t is exact: Y = 0.01 T^2 / 2000
        assert!((last.number("Y").unwrap() - 18.05).abs() < 1e-9);
        assert!(last.number("X").unwrap().abs() < 1e-9);

        let level = read_samples(&dir.path().join("stage-2.jsonl"));
        assert!((level.last().unwrap().number("X").unwrap() - 18.05).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_e2e_sharded_replicas_cover_every_key_once() {
        let keys: Vec<String> = (0..5).map(|i| format!("k{i}")).collect();
        let source = Arc::new(keys.iter().fold(MockSampleSource::new(), |source, key| {
            source.with_batch(key.as_str(), MockSampleSource::ascent(3, 100.0, 45.0))
        }));

        let mut replayed = Vec::new();
        for replica_id in 0..3 {
            let publisher = Arc::new(RecordingPublisher::new());
            let coordinator = Coordinator::new(
                Arc::clone(&source),
                Arc::clone(&publisher),
                ChainFactory::new(&TransformConfig::default()).unwrap(),
                CoordinatorConfig {
                    shard: ShardAssignment::new(replica_id, 2),
                    ..Default::default()
                },
                CancellationToken::new(),
            );
            coordinator.run().await.unwrap();
            for key in &keys {
                if !publisher.samples(&StreamKey::from(key.as_str())).is_empty() {
                    replayed.push(key.clone());
                }
            }
        }

        replayed.sort();
        assert_eq!(replayed, keys);
    }

    #[tokio::test(start_paused = true)]
    async fn test_e2e_cancel_stops_replay_and_drains_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSampleSource::new()
            .with_batch("long", MockSampleSource::ascent(100, 1000.0, 90.0));

        let (publisher, rx) = publish_channel(8);
        let dispatch_handle = create_dispatcher(vec![file_sink(dir.path())], rx)
            .await
            .unwrap()
            .spawn();

        let cancel = CancellationToken::new();
        let coordinator = Coordinator::new(
            Arc::new(source),
            Arc::new(publisher),
            ChainFactory::new(&TransformConfig::default()).unwrap(),
            CoordinatorConfig::default(),
            cancel.clone(),
        );

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });
        let report = coordinator.run().await.unwrap();
        canceller.await.unwrap();
        drop(coordinator);
        let summary = dispatch_handle.await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.published, 3);
        assert_eq!(summary.records, 3);
        assert_eq!(read_samples(&dir.path().join("long.jsonl")).len(), 3);
    }

    /// Multiplexed records -> DemuxScheduler -> integrator -> RecordingPublisher
    #[tokio::test(start_paused = true)]
    async fn test_e2e_demux_integrates_each_key_independently() {
        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = DemuxScheduler::new(
            Arc::clone(&publisher),
            ChainFactory::new(&TransformConfig::default()).unwrap(),
            DemuxConfig {
                queue_capacity: 4,
                max_active_keys: 8,
                speed: 1.0,
            },
            CancellationToken::new(),
        );

        let (tx, rx) = mpsc::channel(4);
        let feeder = tokio::spawn(async move {
            let north = MockSampleSource::ascent(10, 100.0, 90.0);
            let east = MockSampleSource::ascent(10, 100.0, 0.0);
            for (n, e) in north.into_iter().zip(east) {
                tx.send(SinkRecord::new("north".into(), n)).await.unwrap();
                tx.send(SinkRecord::new("east".into(), e)).await.unwrap();
            }
        });

        let started = Instant::now();
        let report = scheduler.run(rx).await;
        feeder.await.unwrap();

        assert_eq!(report.routed, 20);
        assert_eq!(report.lanes.len(), 2);
        assert!(report.lanes.iter().all(|lane| lane.is_complete()));
        // chain pacing: first sample anchors, the other nine are 100ms apart
        assert!(started.elapsed() >= Duration::from_millis(900));

        let north = publisher.samples(&StreamKey::from("north"));
        let east = publisher.samples(&StreamKey::from("east"));
        assert_eq!(north.len(), 9);
        assert_eq!(east.len(), 9);
        assert_eq!(north[0].time, 100.0);

        // Y = 0.01 * 900^2 / 2000 after the last step
        let n_last = north.last().unwrap();
        assert!((n_last.number("Y").unwrap() - 4.05).abs() < 1e-9);
        let e_last = east.last().unwrap();
        assert!((e_last.number("X").unwrap() - 4.05).abs() < 1e-9);
        assert!(e_last.number("Y").unwrap().abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_e2e_demux_with_gap_fill_paces_synthetic_samples() {
        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = DemuxScheduler::new(
            Arc::clone(&publisher),
            ChainFactory::new(&TransformConfig {
                integrate: false,
                gap_fill: true,
                tick_ms: 100.0,
                ..Default::default()
            })
            .unwrap(),
            DemuxConfig::default(),
            CancellationToken::new(),
        );

        let (tx, rx) = mpsc::channel(4);
        for t in [0.0, 500.0] {
            tx.send(SinkRecord::new(
                "k".into(),
                Sample::new(t).with_number("altitude", t),
            ))
            .await
            .unwrap();
        }
        drop(tx);

        let report = scheduler.run(rx).await;
        assert_eq!(report.routed, 2);

        // synthetic samples replace the real one; the first only anchors
        let samples = publisher.samples(&StreamKey::from("k"));
        let times: Vec<f64> = samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![100.0, 200.0, 300.0, 400.0]);
        assert!(samples
            .iter()
            .all(|s| (s.number("altitude").unwrap() - s.time).abs() < 1e-9));
    }
}
