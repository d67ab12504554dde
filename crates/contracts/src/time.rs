//! Timestamp units and conversion to the canonical millisecond clock.

use serde::{Deserialize, Serialize};

/// Unit an external timestamp is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    #[default]
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    /// Milliseconds per one unit
    fn millis_per_unit(self) -> f64 {
        match self {
            Self::Seconds => 1_000.0,
            Self::Milliseconds => 1.0,
            Self::Microseconds => 1e-3,
            Self::Nanoseconds => 1e-6,
        }
    }

    /// Convert a value in this unit to canonical milliseconds
    #[inline]
    pub fn to_millis(self, value: f64) -> f64 {
        value * self.millis_per_unit()
    }

    /// Convert canonical milliseconds back into this unit
    #[inline]
    pub fn from_millis(self, millis: f64) -> f64 {
        millis / self.millis_per_unit()
    }
}
