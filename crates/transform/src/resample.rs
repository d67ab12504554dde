//! Batch resampling to a uniform rate.
//!
//! Works on a fully materialized, time-ordered batch. Output times are
//! `first.time + k * period` for every `k` with `k * period < duration`
//! (half-open). Numeric columns present on the first sample are linearly
//! interpolated; every other column is copied from the first sample.

use contracts::{FieldValue, Sample};
use tracing::{debug, warn};

use crate::TransformError;

/// Default output rate (Hz)
pub const DEFAULT_TARGET_HZ: f64 = 10.0;

/// Relative cadence mismatch above which a warning is logged
const CADENCE_TOLERANCE: f64 = 0.5;

/// Uniform-rate batch resampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampler {
    original_hz: f64,
    target_hz: f64,
}

impl Resampler {
    pub fn new(original_hz: f64, target_hz: f64) -> Result<Self, TransformError> {
        let valid = |hz: f64| hz.is_finite() && hz > 0.0;
        if !valid(original_hz) || !valid(target_hz) {
            return Err(TransformError::InvalidFrequency {
                original_hz,
                target_hz,
            });
        }
        Ok(Self {
            original_hz,
            target_hz,
        })
    }

    #[inline]
    pub fn target_hz(&self) -> f64 {
        self.target_hz
    }

    /// Output spacing (milliseconds)
    #[inline]
    pub fn period_ms(&self) -> f64 {
        1000.0 / self.target_hz
    }

    /// Resample `batch`; fewer than two usable samples give an empty output
    pub fn resample(&self, batch: &[Sample]) -> Vec<Sample> {
        let valid: Vec<&Sample> = batch.iter().filter(|s| s.time.is_finite()).collect();
        let (Some(first), Some(last)) = (valid.first(), valid.last()) else {
            return Vec::new();
        };
        if valid.len() < 2 {
            return Vec::new();
        }

        let duration_ms = last.time - first.time;
        if duration_ms <= 0.0 {
            debug!(samples = valid.len(), "batch has no time span, nothing to resample");
            return Vec::new();
        }
        self.check_cadence(valid.len(), duration_ms);

        let series: Vec<(&str, Vec<(f64, f64)>)> = first
            .numeric_fields()
            .map(|(name, _)| {
                let points = valid
                    .iter()
                    .filter_map(|s| s.number(name).map(|v| (s.time, v)))
                    .collect();
                (name, points)
            })
            .collect();

        let period = self.period_ms();
        // Tiny epsilon keeps float error from adding a sample at `duration`
        let count = (duration_ms / period - 1e-9).ceil().max(0.0) as usize;

        (0..count)
            .map(|k| {
                let time = first.time + k as f64 * period;
                let mut out = Sample::new(time);
                for (name, value) in &first.fields {
                    if !matches!(value, FieldValue::Number(_)) {
                        out.insert(name.clone(), value.clone());
                    }
                }
                for (name, points) in &series {
                    if let Some(v) = interpolate(points, time) {
                        out.set_number(*name, v);
                    }
                }
                out
            })
            .collect()
    }

    fn check_cadence(&self, len: usize, duration_ms: f64) {
        let observed_hz = (len - 1) as f64 / (duration_ms / 1000.0);
        let deviation = (observed_hz - self.original_hz).abs() / self.original_hz;
        if deviation > CADENCE_TOLERANCE {
            warn!(
                observed_hz,
                declared_hz = self.original_hz,
                "observed cadence differs from declared original rate"
            );
        }
    }
}

/// Linear interpolation over time-ordered `(time, value)` points, clamped at both ends
fn interpolate(points: &[(f64, f64)], time: f64) -> Option<f64> {
    let idx = points.partition_point(|(t, _)| *t <= time);
    match idx {
        0 => points.first().map(|(_, v)| *v),
        n if n >= points.len() => points.last().map(|(_, v)| *v),
        n => {
            let (t0, v0) = points[n - 1];
            let (t1, v1) = points[n];
            if t1 <= t0 {
                return Some(v1);
            }
            Some(v0 + (v1 - v0) * (time - t0) / (t1 - t0))
        }
    }
}
