//! Replay metrics
//!
//! Thin recorders over the `metrics` facade plus in-memory aggregation for
//! end-of-run summaries.

use std::collections::HashMap;

use metrics::{counter, gauge, histogram};

/// Record one sample handed to the publisher
pub fn record_sample_published(key: &str) {
    counter!(
        "telemetry_replay_samples_published_total",
        "key" => key.to_string()
    )
    .increment(1);
}

/// Record an intentional pacing sleep
pub fn record_pacing_sleep_ms(strategy: &'static str, sleep_ms: f64) {
    histogram!("telemetry_replay_pacing_sleep_ms", "strategy" => strategy).record(sleep_ms);
}

/// Record how far behind schedule an emission was
pub fn record_pacing_lag_ms(strategy: &'static str, lag_ms: f64) {
    histogram!("telemetry_replay_pacing_lag_ms", "strategy" => strategy).record(lag_ms);
}

/// Record a sample whose time is earlier than its predecessor
pub fn record_time_regression(key: &str, stage: &'static str) {
    counter!(
        "telemetry_replay_time_regressions_total",
        "key" => key.to_string(),
        "stage" => stage
    )
    .increment(1);
}

/// Record a per-key fetch failure (the key is skipped)
pub fn record_fetch_failure(kind: &'static str) {
    counter!("telemetry_replay_fetch_failures_total", "kind" => kind).increment(1);
}

/// Record the number of live demux lanes
pub fn record_active_lanes(count: usize) {
    gauge!("telemetry_replay_active_lanes").set(count as f64);
}

/// Record a lane queue depth
pub fn record_queue_depth(key: &str, depth: usize) {
    gauge!(
        "telemetry_replay_queue_depth",
        "key" => key.to_string()
    )
    .set(depth as f64);
}

/// Record one record delivered (or not) to a sink
pub fn record_record_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "telemetry_replay_records_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Pacing statistics of a single key routine
#[derive(Debug, Clone, Default)]
pub struct PacingStats {
    /// Samples forwarded downstream
    pub emitted: u64,
    /// Samples earlier than their predecessor
    pub regressions: u64,
    /// Intentional sleeps (ms)
    pub sleep_ms: RunningStats,
    /// Emissions behind schedule (ms)
    pub lag_ms: RunningStats,
}

impl PacingStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Replay metrics aggregator
///
/// Collects per-key results in memory for a run summary.
#[derive(Debug, Clone, Default)]
pub struct ReplayMetricsAggregator {
    /// Keys replayed to completion
    pub keys_completed: u64,

    /// Keys skipped, by reason
    pub skipped: HashMap<String, u64>,

    /// Samples forwarded to the publisher
    pub samples_published: u64,

    /// Time regressions observed while pacing
    pub time_regressions: u64,

    /// Sleep statistics (ms)
    pub sleep_stats: RunningStats,

    /// Lag statistics (ms)
    pub lag_stats: RunningStats,
}

impl ReplayMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the stats of one finished key
    pub fn record_completed(&mut self, stats: &PacingStats) {
        self.keys_completed += 1;
        self.samples_published += stats.emitted;
        self.time_regressions += stats.regressions;
        self.sleep_stats.merge(&stats.sleep_ms);
        self.lag_stats.merge(&stats.lag_ms);
    }

    /// Count a skipped key
    pub fn record_skipped(&mut self, reason: &str) {
        *self.skipped.entry(reason.to_string()).or_insert(0) += 1;
    }

    fn keys_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    /// Build a summary report
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            keys_completed: self.keys_completed,
            keys_skipped: self.keys_skipped(),
            samples_published: self.samples_published,
            time_regressions: self.time_regressions,
            sleep_ms: StatsSummary::from(&self.sleep_stats),
            lag_ms: StatsSummary::from(&self.lag_stats),
            skip_reasons: self.skipped.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub keys_completed: u64,
    pub keys_skipped: u64,
    pub samples_published: u64,
    pub time_regressions: u64,
    pub sleep_ms: StatsSummary,
    pub lag_ms: StatsSummary,
    pub skip_reasons: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Replay Metrics Summary ===")?;
        writeln!(f, "Keys completed: {}", self.keys_completed)?;
        writeln!(f, "Keys skipped: {}", self.keys_skipped)?;
        writeln!(f, "Samples published: {}", self.samples_published)?;
        writeln!(f, "Time regressions: {}", self.time_regressions)?;
        writeln!(f, "Pacing sleep (ms): {}", self.sleep_ms)?;
        writeln!(f, "Pacing lag (ms): {}", self.lag_ms)?;

        if !self.skip_reasons.is_empty() {
            writeln!(f, "Skip reasons:")?;
            let mut reasons: Vec<_> = self.skip_reasons.iter().collect();
            reasons.sort();
            for (reason, count) in reasons {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Combine with another accumulator (Chan et al. parallel update)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2 + delta * delta * (self.count * other.count) as f64 / total as f64;
        self.mean += delta * other.count as f64 / total as f64;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = total;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_merge_matches_sequential() {
        let mut left = RunningStats::default();
        let mut right = RunningStats::default();
        let mut all = RunningStats::default();
        for v in [1.0, 2.0, 3.0] {
            left.push(v);
            all.push(v);
        }
        for v in [10.0, 20.0] {
            right.push(v);
            all.push(v);
        }

        left.merge(&right);
        assert_eq!(left.count(), all.count());
        assert!((left.mean() - all.mean()).abs() < 1e-10);
        assert!((left.variance() - all.variance()).abs() < 1e-9);
        assert_eq!(left.max(), 20.0);

        let mut empty = RunningStats::default();
        empty.merge(&all);
        assert_eq!(empty.count(), 5);
    }

    #[test]
    fn test_aggregator_counts() {
        let mut aggregator = ReplayMetricsAggregator::new();

        let mut stats = PacingStats::new();
        stats.emitted = 12;
        stats.regressions = 1;
        stats.sleep_ms.push(100.0);
        aggregator.record_completed(&stats);
        aggregator.record_skipped("not_found");
        aggregator.record_skipped("not_found");
        aggregator.record_skipped("transport");

        assert_eq!(aggregator.keys_completed, 1);
        assert_eq!(aggregator.samples_published, 12);
        assert_eq!(aggregator.keys_skipped(), 3);
        assert_eq!(aggregator.skipped.get("not_found"), Some(&2));
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = ReplayMetricsAggregator::new();
        let mut stats = PacingStats::new();
        stats.emitted = 100;
        aggregator.record_completed(&stats);
        aggregator.record_skipped("schema_invalid");

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Samples published: 100"));
        assert!(output.contains("schema_invalid: 1"));
        assert!(output.contains("Pacing lag (ms): N/A"));
    }
}
