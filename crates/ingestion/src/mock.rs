//! In-memory sample source
//!
//! For tests and demos without an archive.

use std::collections::HashMap;

use contracts::{FetchError, Sample, SampleSource, StreamKey};

use crate::audit_monotonic;

/// Mock sample source
#[derive(Debug, Default, Clone)]
pub struct MockSampleSource {
    order: Vec<StreamKey>,
    batches: HashMap<StreamKey, Result<Vec<Sample>, FetchError>>,
    enumeration_error: Option<FetchError>,
}

impl MockSampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `samples` under `key`
    pub fn with_batch(self, key: impl Into<StreamKey>, samples: Vec<Sample>) -> Self {
        self.with_result(key.into(), Ok(samples))
    }

    /// Fail every fetch of `key`
    pub fn with_failure(self, key: impl Into<StreamKey>, error: FetchError) -> Self {
        self.with_result(key.into(), Err(error))
    }

    /// Fail `list_keys`
    pub fn failing_enumeration(mut self, error: FetchError) -> Self {
        self.enumeration_error = Some(error);
        self
    }

    fn with_result(mut self, key: StreamKey, result: Result<Vec<Sample>, FetchError>) -> Self {
        if self.batches.insert(key.clone(), result).is_none() {
            self.order.push(key);
        }
        self
    }

    /// A straight ascent: constant acceleration, heading fixed at `angle_deg`
    pub fn ascent(count: usize, step_ms: f64, angle_deg: f64) -> Vec<Sample> {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        (0..count)
            .map(|i| {
                let t = i as f64 * step_ms;
                let velocity = 0.01 * t;
                Sample::new(t)
                    .with_number("velocity", velocity)
                    .with_number("velocity_x", velocity * cos)
                    .with_number("velocity_y", velocity * sin)
                    .with_number("altitude", 0.5 * 0.01 * t * t / 1_000_000.0)
                    .with_number("acceleration", 10.0)
                    .with_number("angle", angle_deg)
            })
            .collect()
    }
}

impl SampleSource for MockSampleSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_keys(&self) -> Result<Vec<StreamKey>, FetchError> {
        match &self.enumeration_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.order.clone()),
        }
    }

    async fn fetch(&self, key: &StreamKey) -> Result<Vec<Sample>, FetchError> {
        let samples = self
            .batches
            .get(key)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::not_found(key)))?;
        audit_monotonic(key, &samples);
        Ok(samples)
    }
}
