//! # Transform
//!
//! Sample transforms applied per key before publishing.
//!
//! - [`Integrator`]: trapezoidal position from velocity, reset on time regression
//! - [`GapFiller`]: lag stage + tick-grid expansion, one input to many outputs
//! - [`Resampler`]: batch resampling to a uniform rate
//! - [`TransformChain`]: ordered per-key stages built by [`ChainFactory`]
//!
//! All times are milliseconds.

mod chain;
mod error;
mod gap_fill;
mod integrator;
mod resample;

pub use chain::{ChainFactory, Transform, TransformChain};
pub use error::TransformError;
pub use gap_fill::{
    expand, GapFillSettings, GapFiller, LagStage, DEFAULT_MAX_FILL_SAMPLES, DEFAULT_TICK_MS,
};
pub use integrator::{
    integrate, Integrator, IntegratorState, POSITION_X, POSITION_Y, VELOCITY_X, VELOCITY_Y,
};
pub use resample::{Resampler, DEFAULT_TARGET_HZ};
