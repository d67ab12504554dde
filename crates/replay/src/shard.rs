//! Shard assignment across cooperating replicas.

use std::ops::Range;

/// Which slice of the key list this instance replays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShardAssignment {
    pub replica_id: usize,
    /// Keys per replica; 0 means every key
    pub shard_size: usize,
}

impl ShardAssignment {
    pub fn new(replica_id: usize, shard_size: usize) -> Self {
        Self {
            replica_id,
            shard_size,
        }
    }

    /// Single instance handling every key
    pub fn all() -> Self {
        Self::default()
    }

    /// `replica_id * shard_size .. + shard_size`, clamped to `total`
    pub fn range(&self, total: usize) -> Range<usize> {
        if self.shard_size == 0 {
            return 0..total;
        }
        let start = self.replica_id.saturating_mul(self.shard_size).min(total);
        let end = start.saturating_add(self.shard_size).min(total);
        start..end
    }

    /// The assigned slice of `keys`
    pub fn select<'a, T>(&self, keys: &'a [T]) -> &'a [T] {
        &keys[self.range(keys.len())]
    }
}
