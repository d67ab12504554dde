//! SinkHandle - one sink behind its own queue and worker task

use std::sync::Arc;

use contracts::{DataSink, OverflowPolicy, SinkRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::SinkMetrics;

/// Result of offering a record to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full under `drop_newest`
    Dropped,
    /// Worker is gone
    Closed,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<SinkRecord>,
    overflow: OverflowPolicy,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker for `sink`; `queue_capacity` is clamped to at least 1
    pub fn spawn<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        overflow: OverflowPolicy,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_handle = tokio::spawn(sink_worker(
            sink,
            rx,
            Arc::clone(&metrics),
            name.clone(),
        ));

        Self {
            name,
            tx,
            overflow,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Offer a record according to the overflow policy.
    ///
    /// `Block` waits for room; `DropNewest` refuses the record when full.
    pub async fn send(&self, record: SinkRecord) -> Delivery {
        let delivery = match self.overflow {
            OverflowPolicy::Block => match self.tx.send(record).await {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
            OverflowPolicy::DropNewest => match self.tx.try_send(record) {
                Ok(()) => Delivery::Queued,
                Err(mpsc::error::TrySendError::Full(record)) => {
                    self.metrics.record_dropped();
                    warn!(
                        sink = %self.name,
                        key = %record.key,
                        time_ms = record.sample.time,
                        "Queue full, record dropped"
                    );
                    Delivery::Dropped
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
            },
        };

        match delivery {
            Delivery::Queued => self
                .metrics
                .set_queue_len(self.tx.max_capacity() - self.tx.capacity()),
            Delivery::Closed => error!(sink = %self.name, "Sink worker closed unexpectedly"),
            Delivery::Dropped => {}
        }
        delivery
    }

    /// Close the queue and wait for the worker to drain it
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("name", &self.name)
            .field("overflow", &self.overflow)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// Drain the queue into the sink until every sender is gone
#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SinkRecord>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!("Sink worker started");

    while let Some(record) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&record).await {
            Ok(()) => metrics.record_write(&name, true),
            Err(e) => {
                metrics.record_write(&name, false);
                error!(key = %record.key, time_ms = record.sample.time, error = %e, "Write failed");
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "Close failed on shutdown");
    }

    debug!("Sink worker stopped");
}
