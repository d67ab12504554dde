//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use contracts::{ContractError, Publisher, Sample, StreamKey};

/// Publisher that records every call, optionally failing after `n` accepts
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    records: Mutex<Vec<(StreamKey, Sample)>>,
    fail_after: Option<usize>,
}

impl RecordingPublisher {
    pub fn failing_after(accepted: usize) -> Self {
        Self {
            records: Mutex::default(),
            fail_after: Some(accepted),
        }
    }

    pub fn times(&self, key: &StreamKey) -> Vec<f64> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, s)| s.time)
            .collect()
    }

    pub fn per_key(&self) -> HashMap<StreamKey, Vec<Sample>> {
        let mut map: HashMap<StreamKey, Vec<Sample>> = HashMap::new();
        for (key, sample) in self.records.lock().unwrap().iter() {
            map.entry(key.clone()).or_default().push(sample.clone());
        }
        map
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl Publisher for RecordingPublisher {
    async fn publish(&self, key: &StreamKey, sample: &Sample) -> Result<(), ContractError> {
        let mut records = self.records.lock().unwrap();
        if self.fail_after.is_some_and(|n| records.len() >= n) {
            return Err(ContractError::sink_write("recording", "rejected"));
        }
        records.push((key.clone(), sample.clone()));
        Ok(())
    }
}
