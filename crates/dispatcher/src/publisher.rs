//! Publisher bridge from the replay core into the dispatcher channel

use contracts::{ContractError, Publisher, Sample, SinkRecord, StreamKey};
use tokio::sync::mpsc;

/// Publisher that feeds a [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone)]
pub struct DispatcherPublisher {
    tx: mpsc::Sender<SinkRecord>,
}

impl DispatcherPublisher {
    pub fn new(tx: mpsc::Sender<SinkRecord>) -> Self {
        Self { tx }
    }
}

/// Publisher plus the receiver a dispatcher consumes
pub fn publish_channel(capacity: usize) -> (DispatcherPublisher, mpsc::Receiver<SinkRecord>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DispatcherPublisher::new(tx), rx)
}

impl Publisher for DispatcherPublisher {
    /// One record per call; waits while the dispatcher is behind
    async fn publish(&self, key: &StreamKey, sample: &Sample) -> Result<(), ContractError> {
        self.tx
            .send(SinkRecord::new(key.clone(), sample.clone()))
            .await
            .map_err(|_| ContractError::sink_closed("dispatcher"))
    }
}
