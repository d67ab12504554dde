//! SampleSource trait - archived telemetry abstraction
//!
//! Decouples the replay core from where samples come from (HTTP archive,
//! JSONL file, in-memory mock).

use crate::{FetchError, Sample, StreamKey};

/// Archived sample source
///
/// # Contract
///
/// 1. `list_keys` enumerates every stream the source can serve. Failing here
///    is the only fatal error of a replay run.
/// 2. `fetch` returns one key's samples in archive order, already converted to
///    milliseconds and validated for required fields. A failure only affects
///    that key.
#[trait_variant::make(SampleSource: Send)]
pub trait LocalSampleSource {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Enumerate the keys this source can serve
    async fn list_keys(&self) -> Result<Vec<StreamKey>, FetchError>;

    /// Fetch the ordered samples of one key
    async fn fetch(&self, key: &StreamKey) -> Result<Vec<Sample>, FetchError>;
}
