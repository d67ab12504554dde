//! Pipeline orchestrator - wires source, replay engine and dispatcher.
//!
//! Both modes share the same downstream half: a [`DispatcherPublisher`]
//! feeding a spawned [`Dispatcher`](dispatcher::Dispatcher). Cancellation
//! flows through one token; after it fires, sinks get a bounded grace period
//! to drain.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{ReplayBlueprint, SinkRecord};
use dispatcher::{create_dispatcher, publish_channel, DispatchSummary, DispatcherPublisher};
use ingestion::{stream_multiplexed, ConfiguredSource, IngestionError, LineFormat, StreamSummary};
use observability::ReplayMetricsAggregator;
use replay::{Coordinator, CoordinatorConfig, DemuxConfig, DemuxScheduler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use transform::ChainFactory;

use super::{RunMode, RunStats};
use crate::error::{CliError, Result};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded configuration, CLI overrides applied
    pub blueprint: ReplayBlueprint,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel buffer size
    pub buffer_size: usize,

    /// Dispatcher drain limit once cancelled
    pub shutdown_grace: Duration,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replay every assigned key of the configured source
    #[instrument(name = "pipeline_batch", skip(self))]
    pub async fn run_batch(&self) -> Result<RunStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        let source = ConfiguredSource::from_config(&blueprint.source).await?;
        let factory = ChainFactory::new(&blueprint.transform)?;
        let (publisher, dispatch_handle) = self.start_dispatcher().await?;
        self.arm_timeout();

        let coordinator = Coordinator::new(
            Arc::new(source),
            Arc::new(publisher),
            factory,
            CoordinatorConfig::from(&blueprint.replay),
            self.cancel.clone(),
        );
        let run = coordinator.run().await;
        // releases the last publisher so the dispatcher sees end of input
        drop(coordinator);
        let report = run?;

        let dispatch = self.join_dispatcher(dispatch_handle).await?;

        Ok(RunStats {
            mode: RunMode::Batch,
            duration: start_time.elapsed(),
            keys_total: report.total_keys,
            keys_assigned: report.assigned,
            skipped: report.skipped,
            published: report.published,
            input_dropped: 0,
            cancelled: report.cancelled,
            dispatch,
            metrics: report.metrics,
        })
    }

    /// Replay a multiplexed JSONL file through per-key lanes
    #[instrument(name = "pipeline_demux", skip_all, fields(input = %input.display()))]
    pub async fn run_demux(&self, input: &Path) -> Result<RunStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        let factory = ChainFactory::new(&blueprint.transform)?;
        let (publisher, dispatch_handle) = self.start_dispatcher().await?;
        self.arm_timeout();

        let (input_tx, input_rx) = mpsc::channel::<SinkRecord>(self.config.buffer_size.max(1));
        let format = LineFormat::from_config(&blueprint.source);
        let path = input.to_path_buf();
        let cancel = self.cancel.clone();
        let reader = tokio::spawn(async move {
            stream_multiplexed(path, &format, input_tx, cancel).await
        });

        let scheduler = DemuxScheduler::new(
            Arc::new(publisher),
            factory,
            DemuxConfig {
                queue_capacity: blueprint.replay.queue_capacity,
                max_active_keys: blueprint.replay.max_active_keys,
                speed: blueprint.replay.speed,
            },
            self.cancel.clone(),
        );
        let report = scheduler.run(input_rx).await;
        drop(scheduler);

        let read = reader.await;
        // sinks drain before any reader error surfaces
        let dispatch = self.join_dispatcher(dispatch_handle).await?;

        let streamed = match read {
            Ok(Ok(streamed)) => streamed,
            Ok(Err(IngestionError::ChannelClosed)) if self.cancel.is_cancelled() => {
                debug!("input reader stopped by cancellation");
                StreamSummary::default()
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(CliError::shutdown(format!("input reader failed: {e}"))),
        };

        let mut metrics = ReplayMetricsAggregator::new();
        let mut skipped = Vec::new();
        for lane in &report.lanes {
            match &lane.error {
                None => metrics.record_completed(&lane.stats),
                Some(e) => {
                    metrics.record_skipped(e.kind());
                    skipped.push((lane.key.clone(), e.to_string()));
                }
            }
        }

        info!(
            lines = streamed.forwarded,
            rejected = streamed.rejected,
            routed = report.routed,
            evicted = report.evicted,
            "multiplexed input consumed"
        );

        Ok(RunStats {
            mode: RunMode::Demux,
            duration: start_time.elapsed(),
            keys_total: report.lanes.len(),
            keys_assigned: report.lanes.len(),
            skipped,
            published: report.published(),
            input_dropped: report.dropped + streamed.rejected,
            cancelled: self.cancel.is_cancelled(),
            dispatch,
            metrics,
        })
    }

    async fn start_dispatcher(
        &self,
    ) -> Result<(DispatcherPublisher, JoinHandle<DispatchSummary>)> {
        let sinks = self.config.blueprint.sinks.clone();
        if sinks.is_empty() {
            warn!("No sinks configured - replayed samples will be discarded");
        }

        let (publisher, rx) = publish_channel(self.config.buffer_size);
        let dispatcher = create_dispatcher(sinks, rx).await?;
        Ok((publisher, dispatcher.spawn()))
    }

    /// Cancel the run once the configured timeout elapses
    fn arm_timeout(&self) {
        let Some(timeout) = self.config.timeout else {
            return;
        };
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_secs = timeout.as_secs(), "Run timed out, cancelling");
                    cancel.cancel();
                }
            }
        });
    }

    /// Wait for the dispatcher; bounded by the grace period after cancellation
    async fn join_dispatcher(&self, handle: JoinHandle<DispatchSummary>) -> Result<DispatchSummary> {
        let joined = if self.cancel.is_cancelled() {
            let grace = self.config.shutdown_grace;
            match tokio::time::timeout(grace, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(grace_secs = grace.as_secs(), "Dispatcher did not drain in time");
                    return Err(CliError::shutdown("dispatcher drain timed out"));
                }
            }
        } else {
            handle.await
        };
        joined.map_err(|e| CliError::shutdown(format!("dispatcher task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{SinkConfig, SinkType, SourceConfig, SourceKind, TimeUnit};
    use std::collections::HashMap;
    use std::io::Write;

    fn blueprint(source_path: &Path, out_dir: &Path) -> ReplayBlueprint {
        let toml = format!(
            r#"
            [source]
            kind = "jsonl"
            path = "{}"
            required_fields = ["velocity"]

            [replay]
            speed = 1000.0

            [[sinks]]
            name = "archive"
            sink_type = "file"
            params = {{ base_path = "{}" }}
            "#,
            source_path.display(),
            out_dir.display()
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    fn write_stream(path: &Path) {
        let mut file = std::fs::File::create(path).unwrap();
        for t in 0..5 {
            for key in ["a", "b"] {
                writeln!(
                    file,
                    r#"{{"key": "{key}", "time": {}, "velocity": 10.0, "velocity_x": 0.0, "velocity_y": 10.0}}"#,
                    t * 100
                )
                .unwrap();
            }
        }
    }

    fn config(blueprint: ReplayBlueprint) -> PipelineConfig {
        PipelineConfig {
            blueprint,
            timeout: None,
            buffer_size: 16,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_batch_run_writes_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("archive.jsonl");
        let out = dir.path().join("out");
        write_stream(&input);

        let pipeline = Pipeline::new(config(blueprint(&input, &out)));
        let stats = pipeline.run_batch().await.unwrap();

        assert_eq!(stats.keys_total, 2);
        assert_eq!(stats.published, 10);
        assert_eq!(stats.dispatch.records, 10);
        assert!(!stats.cancelled);
        let written = std::fs::read_to_string(out.join("a.jsonl")).unwrap();
        assert_eq!(written.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_demux_run_routes_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mux.jsonl");
        let out = dir.path().join("out");
        write_stream(&input);

        let pipeline = Pipeline::new(config(blueprint(&input, &out)));
        let stats = pipeline.run_demux(&input).await.unwrap();

        assert_eq!(stats.mode, RunMode::Demux);
        assert_eq!(stats.keys_total, 2);
        // the chain pacer holds back each key's first sample
        assert_eq!(stats.published, 8);
        assert!(out.join("b.jsonl").exists());
    }

    #[tokio::test]
    async fn test_cancelled_demux_run_drains_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("slow.jsonl");
        let out = dir.path().join("out");
        {
            let mut file = std::fs::File::create(&input).unwrap();
            for i in 0..200 {
                writeln!(file, r#"{{"key": "slow", "time": {}, "velocity": 1.0}}"#, i * 60_000).unwrap();
            }
        }

        let mut blueprint = blueprint(&input, &out);
        blueprint.replay.speed = 1.0;
        blueprint.replay.queue_capacity = 1;
        blueprint.transform.integrate = false;
        let pipeline = Pipeline::new(PipelineConfig {
            buffer_size: 1,
            ..config(blueprint)
        });

        let cancel = pipeline.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let stats = pipeline.run_demux(&input).await.unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.published, 0);
        assert_eq!(stats.keys_total, 1);
    }

    #[tokio::test]
    async fn test_missing_source_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = ReplayBlueprint {
            version: Default::default(),
            source: SourceConfig {
                kind: SourceKind::Jsonl,
                url: None,
                missions: Vec::new(),
                path: Some(dir.path().join("absent.jsonl")),
                key_field: "key".to_string(),
                time_unit: TimeUnit::Milliseconds,
                required_fields: Vec::new(),
                request_timeout_s: 30,
            },
            replay: Default::default(),
            transform: Default::default(),
            sinks: vec![SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 10,
                overflow: Default::default(),
                params: HashMap::new(),
            }],
        };

        let result = Pipeline::new(config(blueprint)).run_batch().await;
        assert!(matches!(result, Err(CliError::Source(_))));
    }
}
