//! Per-sink delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use observability::record_record_dispatched;

/// Counters for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Records waiting in the sink queue
    queue_len: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    /// Records refused by a full `drop_newest` queue
    dropped: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Count one write attempt and export it
    pub fn record_write(&self, sink_name: &str, success: bool) {
        if success {
            self.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        record_record_dispatched(sink_name, success);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            written: self.written(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl MetricsSnapshot {
    /// Records offered to the sink, written or not
    pub fn offered(&self) -> u64 {
        self.written + self.failed + self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = SinkMetrics::new();
        metrics.record_write("s", true);
        metrics.record_write("s", true);
        metrics.record_write("s", false);
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.written, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.offered(), 4);
    }
}
