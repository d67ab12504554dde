//! Dispatcher - main loop for fan-out to sinks

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{SinkConfig, SinkRecord, SinkType};

use crate::error::DispatcherError;
use crate::handle::{Delivery, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<SinkRecord>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<SinkRecord>) -> Self {
        Self { config, input_rx }
    }

    /// Create every configured sink and start its worker
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config).await?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    async fn initialize_handles(
        config: &DispatcherConfig,
    ) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut names = HashSet::new();
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            if !names.insert(sink_config.name.as_str()) {
                return Err(DispatcherError::DuplicateSink(sink_config.name.clone()));
            }
            handles.push(create_sink_handle(sink_config).await?);
        }
        Ok(handles)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let (capacity, overflow) = (config.queue_capacity, config.overflow);
    match config.sink_type {
        SinkType::Log => Ok(SinkHandle::spawn(
            LogSink::new(&config.name),
            capacity,
            overflow,
        )),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, capacity, overflow))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, capacity, overflow))
        }
    }
}

/// Totals of one dispatcher run
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Records received from the core
    pub records: u64,
    /// Final per-sink counters
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl DispatchSummary {
    pub fn dropped(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.dropped).sum()
    }
}

/// Fans records out to every sink
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<SinkRecord>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<SinkRecord>) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until the input channel closes, then drain and close every sink.
    ///
    /// Records reach each sink in arrival order.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchSummary {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut records: u64 = 0;
        while let Some(record) = self.input_rx.recv().await {
            records += 1;
            self.dispatch_record(record).await;

            if records.is_multiple_of(1000) {
                debug!(records, "Dispatcher progress");
            }
        }

        info!(records, "Dispatcher input closed, shutting down");

        let summary = DispatchSummary {
            records,
            sinks: self.metrics(),
        };
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!(dropped = summary.dropped(), "Dispatcher shutdown complete");
        summary
    }

    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }

    async fn dispatch_record(&self, record: SinkRecord) {
        let Some((last, rest)) = self.handles.split_last() else {
            return;
        };
        for handle in rest {
            if handle.send(record.clone()).await == Delivery::Closed {
                debug!(sink = handle.name(), "record not delivered");
            }
        }
        if last.send(record).await == Delivery::Closed {
            debug!(sink = last.name(), "record not delivered");
        }
    }
}

/// Create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<SinkRecord>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}
