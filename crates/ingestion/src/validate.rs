//! Batch checks applied before a key is replayed.

use contracts::{FetchError, Sample, StreamKey};
use observability::record_time_regression;
use tracing::warn;

/// Every sample must carry every required field.
///
/// An empty batch is valid.
pub fn validate_batch(
    key: &StreamKey,
    samples: &[Sample],
    required_fields: &[String],
) -> Result<(), FetchError> {
    for (index, sample) in samples.iter().enumerate() {
        if let Some(missing) = required_fields.iter().find(|f| !sample.has_field(f)) {
            return Err(FetchError::schema_invalid(
                key,
                format!("sample {index} is missing required field '{missing}'"),
            ));
        }
    }
    Ok(())
}

/// Count samples whose time goes backwards.
///
/// Regressions are reported, never reordered.
pub fn audit_monotonic(key: &StreamKey, samples: &[Sample]) -> usize {
    let mut regressions = 0;
    for (index, pair) in samples.windows(2).enumerate() {
        if pair[1].time < pair[0].time {
            regressions += 1;
            warn!(
                key = %key,
                index = index + 1,
                previous_ms = pair[0].time,
                time_ms = pair[1].time,
                "archive time regression"
            );
            record_time_regression(key, "source");
        }
    }
    regressions
}
