//! Gap-fill expansion.
//!
//! Two stages per key:
//! 1. [`LagStage`] pairs each sample with the one stored before it.
//! 2. [`expand`] replaces the current sample with synthetic samples laid
//!    on a fixed tick grid across `[last_value.time, sample.time)`.
//!
//! A single gap yields at most `max_samples` synthetic samples; longer gaps
//! are truncated with a warning.

use contracts::{FieldValue, Sample};
use tracing::{trace, warn};

use crate::TransformError;

/// Default tick resolution (milliseconds)
pub const DEFAULT_TICK_MS: f64 = 100.0;

/// Default cap on synthetic samples per gap
pub const DEFAULT_MAX_FILL_SAMPLES: usize = 10_000;

/// Remembers the previous sample of one key
#[derive(Debug, Clone, Default)]
pub struct LagStage {
    stored: Option<Sample>,
}

impl LagStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the previously stored sample and store `sample` in its place
    pub fn lag(&mut self, sample: &Sample) -> Option<Sample> {
        self.stored.replace(sample.clone())
    }
}

/// Expansion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapFillSettings {
    /// Grid resolution (milliseconds)
    pub tick_ms: f64,
    /// Stamp synthetic samples with their grid time instead of the current
    /// sample's time
    pub interpolate_time: bool,
    /// Cap on synthetic samples per gap
    pub max_samples: usize,
}

impl Default for GapFillSettings {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            interpolate_time: true,
            max_samples: DEFAULT_MAX_FILL_SAMPLES,
        }
    }
}

/// Expand the gap between `last_value` and `sample`.
///
/// Numeric columns are interpolated at fraction `i / steps` for
/// `i in 0..floor(steps)`, where `steps = (sample.time - last_value.time) / tick`.
/// Non-numeric columns come from `sample`. Numeric columns `last_value`
/// lacks keep the current value. At most `settings.max_samples` are produced.
pub fn expand(
    sample: &Sample,
    last_value: Option<&Sample>,
    settings: &GapFillSettings,
) -> Vec<Sample> {
    let Some(last) = last_value else {
        return Vec::new();
    };

    let steps = (sample.time - last.time) / settings.tick_ms;
    if !steps.is_finite() || steps <= 0.0 {
        return Vec::new();
    }

    // float to int casts saturate
    let wanted = steps.floor() as usize;
    let count = wanted.min(settings.max_samples);
    if count < wanted {
        warn!(
            from = last.time,
            to = sample.time,
            wanted,
            limit = settings.max_samples,
            "gap too long, truncating fill"
        );
    }

    let mut out = Vec::new();
    for i in 0..count {
        let fraction = i as f64 / steps;
        let mut synthetic = Sample::new(if settings.interpolate_time {
            last.time + i as f64 * settings.tick_ms
        } else {
            sample.time
        });

        for (name, value) in &sample.fields {
            let filled = match (value, last.number(name)) {
                (FieldValue::Number(current), Some(previous)) => {
                    FieldValue::Number(previous + (current - previous) * fraction)
                }
                _ => value.clone(),
            };
            synthetic.insert(name.clone(), filled);
        }
        out.push(synthetic);
    }

    trace!(
        from = last.time,
        to = sample.time,
        generated = out.len(),
        "gap expanded"
    );
    out
}

/// Stateful gap filler for one key
#[derive(Debug, Clone)]
pub struct GapFiller {
    lag: LagStage,
    settings: GapFillSettings,
}

impl GapFiller {
    pub fn new(settings: GapFillSettings) -> Result<Self, TransformError> {
        if !settings.tick_ms.is_finite() || settings.tick_ms <= 0.0 {
            return Err(TransformError::InvalidTick {
                tick_ms: settings.tick_ms,
            });
        }
        if settings.max_samples == 0 {
            return Err(TransformError::InvalidFillLimit);
        }
        Ok(Self {
            lag: LagStage::new(),
            settings,
        })
    }

    /// Feed one sample; the output replaces it downstream
    pub fn apply(&mut self, sample: &Sample) -> Vec<Sample> {
        let last_value = self.lag.lag(sample);
        expand(sample, last_value.as_ref(), &self.settings)
    }

    pub fn settings(&self) -> &GapFillSettings {
        &self.settings
    }
}
