//! Per-key bounded FIFO with a close sentinel.
//!
//! A full queue makes `put` wait (backpressure); an empty queue makes `get`
//! wait for data or for the close sentinel.

use async_channel::{bounded, Receiver, Sender};
use contracts::{Sample, StreamKey};

use crate::{ReplayError, Result};

/// Default capacity per key
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Queue item
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Sample(Sample),
    /// Ends the consuming routine cleanly
    Close,
}

/// Create a queue for `key`; capacity is clamped to at least 1
pub fn bounded_queue(key: StreamKey, capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        QueueSender {
            key: key.clone(),
            tx,
        },
        QueueReceiver { key, rx },
    )
}

/// Producer half
#[derive(Debug, Clone)]
pub struct QueueSender {
    key: StreamKey,
    tx: Sender<QueueItem>,
}

impl QueueSender {
    /// Enqueue a sample, waiting while the queue is full
    pub async fn put(&self, sample: Sample) -> Result<()> {
        self.send(QueueItem::Sample(sample)).await
    }

    /// Enqueue the close sentinel behind any pending samples
    pub async fn close(&self) -> Result<()> {
        self.send(QueueItem::Close).await
    }

    async fn send(&self, item: QueueItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| ReplayError::QueueClosed {
                key: self.key.to_string(),
            })
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    /// Whether the consumer is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half
#[derive(Debug)]
pub struct QueueReceiver {
    key: StreamKey,
    rx: Receiver<QueueItem>,
}

impl QueueReceiver {
    /// Next sample; `None` on the close sentinel or when every producer is gone
    pub async fn get(&self) -> Option<Sample> {
        match self.rx.recv().await {
            Ok(QueueItem::Sample(sample)) => Some(sample),
            Ok(QueueItem::Close) => {
                self.rx.close();
                None
            }
            Err(_) => None,
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
