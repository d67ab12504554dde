//! Per-key transform chain.
//!
//! A chain is an ordered list of stateful stages. Each stage maps one sample
//! to zero or more samples; the chain feeds every output of a stage, in
//! order, into the next one.

use contracts::{Sample, TransformConfig};

use crate::{GapFillSettings, GapFiller, Integrator, Resampler, TransformError};

/// One stateful per-key stage
pub trait Transform: Send {
    /// Stage name (used for logging)
    fn name(&self) -> &'static str;

    /// Map one input sample to its outputs, in order
    fn apply(&mut self, sample: Sample) -> Vec<Sample>;
}

impl Transform for Integrator {
    fn name(&self) -> &'static str {
        "integrate"
    }

    fn apply(&mut self, sample: Sample) -> Vec<Sample> {
        Integrator::apply(self, sample).into_iter().collect()
    }
}

impl Transform for GapFiller {
    fn name(&self) -> &'static str {
        "gap_fill"
    }

    fn apply(&mut self, sample: Sample) -> Vec<Sample> {
        GapFiller::apply(self, &sample)
    }
}

/// Ordered stages owned by one key's routine
#[derive(Default)]
pub struct TransformChain {
    stages: Vec<Box<dyn Transform>>,
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

impl TransformChain {
    /// Chain that passes samples through unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Transform + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in application order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `sample` through every stage
    pub fn apply(&mut self, sample: Sample) -> Vec<Sample> {
        let mut batch = vec![sample];
        for stage in &mut self.stages {
            if batch.is_empty() {
                break;
            }
            batch = batch.into_iter().flat_map(|s| stage.apply(s)).collect();
        }
        batch
    }
}

/// Builds fresh per-key chains from configuration
#[derive(Debug, Clone)]
pub struct ChainFactory {
    integrate: bool,
    gap_fill: Option<GapFiller>,
    resampler: Option<Resampler>,
}

impl ChainFactory {
    /// Validate the configuration once; `build` then cannot fail
    pub fn new(config: &TransformConfig) -> Result<Self, TransformError> {
        let gap_fill = if config.gap_fill {
            Some(GapFiller::new(GapFillSettings {
                tick_ms: config.tick_ms,
                interpolate_time: config.interpolate_time,
                max_samples: config.max_fill_samples,
            })?)
        } else {
            None
        };

        let resampler = if config.resample.enabled {
            Some(Resampler::new(
                config.resample.original_hz,
                config.resample.target_hz,
            )?)
        } else {
            None
        };

        Ok(Self {
            integrate: config.integrate,
            gap_fill,
            resampler,
        })
    }

    /// New chain with fresh state: gap fill first, then integration
    pub fn build(&self) -> TransformChain {
        let mut chain = TransformChain::identity();
        if let Some(filler) = &self.gap_fill {
            chain = chain.with_stage(filler.clone());
        }
        if self.integrate {
            chain = chain.with_stage(Integrator::new());
        }
        chain
    }

    /// Batch resampler applied before pacing, when enabled
    pub fn resampler(&self) -> Option<&Resampler> {
        self.resampler.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{POSITION_X, VELOCITY_X, VELOCITY_Y};

    fn velocity(time: f64, vx: f64) -> Sample {
        Sample::new(time)
            .with_number(VELOCITY_X, vx)
            .with_number(VELOCITY_Y, 0.0)
    }

    #[test]
    fn test_identity_passes_through() {
        let mut chain = TransformChain::identity();
        let out = chain.apply(Sample::new(1.0));
        assert_eq!(out, vec![Sample::new(1.0)]);
    }

    #[test]
    fn test_default_config_integrates() {
        let factory = ChainFactory::new(&TransformConfig::default()).unwrap();
        let mut chain = factory.build();
        assert_eq!(chain.stage_names(), vec!["integrate"]);
        assert!(factory.resampler().is_none());

        chain.apply(velocity(0.0, 0.0));
        let out = chain.apply(velocity(1000.0, 10.0));
        assert_eq!(out.len(), 1);
        assert!((out[0].number(POSITION_X).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_fill_then_integrate() {
        let config = TransformConfig {
            gap_fill: true,
            ..Default::default()
        };
        let mut chain = ChainFactory::new(&config).unwrap().build();
        assert_eq!(chain.stage_names(), vec!["gap_fill", "integrate"]);

        assert!(chain.apply(velocity(0.0, 10.0)).is_empty());
        let out = chain.apply(velocity(300.0, 10.0));
        let xs: Vec<f64> = out.iter().map(|s| s.number(POSITION_X).unwrap()).collect();
        assert_eq!(out.len(), 3);
        assert!((xs[0] - 0.0).abs() < 1e-9);
        assert!((xs[1] - 1.0).abs() < 1e-9);
        assert!((xs[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_chains_do_not_share_state() {
        let factory = ChainFactory::new(&TransformConfig::default()).unwrap();
        let mut a = factory.build();
        let mut b = factory.build();
        a.apply(velocity(0.0, 10.0));
        a.apply(velocity(1000.0, 10.0));
        let out = b.apply(velocity(5000.0, 10.0));
        assert_eq!(out[0].number(POSITION_X), Some(0.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TransformConfig {
            gap_fill: true,
            tick_ms: -5.0,
            ..Default::default()
        };
        assert!(ChainFactory::new(&config).is_err());

        config.gap_fill = false;
        config.resample.enabled = true;
        config.resample.target_hz = 0.0;
        assert!(matches!(
            ChainFactory::new(&config),
            Err(TransformError::InvalidFrequency { .. })
        ));
    }
}
