//! Run statistics and summary output.

use std::time::Duration;

use contracts::StreamKey;
use dispatcher::DispatchSummary;
use observability::ReplayMetricsAggregator;

/// Which engine produced the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Keyed batches through the coordinator
    #[default]
    Batch,
    /// Multiplexed stream through the demux scheduler
    Demux,
}

/// Statistics from a replay run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub mode: RunMode,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Keys known to the source (batch) or seen on the stream (demux)
    pub keys_total: usize,

    /// Keys this instance replayed
    pub keys_assigned: usize,

    /// Keys given up on, with the reason
    pub skipped: Vec<(StreamKey, String)>,

    /// Samples accepted by the publisher
    pub published: u64,

    /// Input records lost before reaching a key routine
    pub input_dropped: u64,

    /// Whether the run was cut short
    pub cancelled: bool,

    /// Per-sink totals
    pub dispatch: DispatchSummary,

    pub metrics: ReplayMetricsAggregator,
}

impl RunStats {
    /// Published samples per wall-clock second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.published as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Replay Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Mode: {:?}", self.mode);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Keys: {} of {}", self.keys_assigned, self.keys_total);
        println!("   ├─ Samples published: {}", self.published);
        println!("   ├─ Throughput: {:.2} samples/s", self.throughput());
        println!("   ├─ Input dropped: {}", self.input_dropped);
        println!("   └─ Cancelled: {}", self.cancelled);

        if !self.skipped.is_empty() {
            println!("\n⚠️  Skipped Keys");
            for (i, (key, reason)) in self.skipped.iter().enumerate() {
                let prefix = if i == self.skipped.len() - 1 { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, key, reason);
            }
        }

        if !self.dispatch.sinks.is_empty() {
            println!("\n📤 Sinks ({} records in)", self.dispatch.records);
            for (i, (name, snapshot)) in self.dispatch.sinks.iter().enumerate() {
                let prefix = if i == self.dispatch.sinks.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: written {}, failed {}, dropped {}",
                    prefix, name, snapshot.written, snapshot.failed, snapshot.dropped
                );
            }
        }

        println!("\n📈 {}", self.metrics.summary());
    }
}
