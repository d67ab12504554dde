//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only, never on each other's internals.
//!
//! ## Time Model
//! - `Sample::time` is always milliseconds (f64) once inside the pipeline
//! - Sources convert from their declared [`TimeUnit`] at decode time
//! - Pacers convert millisecond deltas to wall-clock `Duration`s

mod blueprint;
mod error;
mod sample;
mod sink;
mod source;
mod stream_key;
mod time;

pub use blueprint::*;
pub use error::*;
pub use sample::*;
pub use sink::*;
pub use source::{LocalSampleSource, SampleSource};
pub use stream_key::StreamKey;
pub use time::TimeUnit;
