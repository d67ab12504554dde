//! Kinematic integrator: derives planar position from velocity.
//!
//! Trapezoidal integration of `velocity_x` / `velocity_y` (m/s) over the
//! millisecond gap between consecutive samples of one key. The running
//! position is written back as the `X` / `Y` columns (metres).

use contracts::Sample;
use tracing::{debug, warn};

/// Horizontal velocity column (m/s)
pub const VELOCITY_X: &str = "velocity_x";
/// Vertical velocity column (m/s)
pub const VELOCITY_Y: &str = "velocity_y";
/// Derived horizontal position column (m)
pub const POSITION_X: &str = "X";
/// Derived vertical position column (m)
pub const POSITION_Y: &str = "Y";

const REQUIRED: [&str; 2] = [VELOCITY_X, VELOCITY_Y];

/// Per-key integration state
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratorState {
    /// Last emitted sample (already carrying `X`/`Y`)
    pub previous: Sample,
    pub previous_x: f64,
    pub previous_y: f64,
}

impl IntegratorState {
    /// Seed a state from a sample, as if it were the first one seen
    pub fn seed(sample: &Sample) -> Self {
        Self {
            previous: sample.clone(),
            previous_x: 0.0,
            previous_y: 0.0,
        }
    }

    #[inline]
    fn has_velocity(&self) -> bool {
        self.previous.has_numbers(&REQUIRED)
    }
}

/// Apply one integration step.
///
/// Returns `None` (state untouched) when the sample has no velocity
/// components. A missing or velocity-less prior state, or a sample earlier
/// than the prior one, starts a fresh origin at `X = Y = 0`.
pub fn integrate(mut sample: Sample, state: &mut Option<IntegratorState>) -> Option<Sample> {
    let (vx, vy) = match (sample.number(VELOCITY_X), sample.number(VELOCITY_Y)) {
        (Some(vx), Some(vy)) => (vx, vy),
        _ => {
            debug!(time = sample.time, "sample has no velocity components, skipped");
            return None;
        }
    };

    let prior = state.as_ref().filter(|s| s.has_velocity());
    let (x, y) = match prior {
        None => (0.0, 0.0),
        Some(prev) if sample.time < prev.previous.time => {
            warn!(
                time = sample.time,
                previous = prev.previous.time,
                "time regression, integrator reset to origin"
            );
            (0.0, 0.0)
        }
        Some(prev) => {
            let dt = sample.time - prev.previous.time;
            // has_velocity() guarantees both lookups succeed
            let pvx = prev.previous.number(VELOCITY_X).unwrap_or(vx);
            let pvy = prev.previous.number(VELOCITY_Y).unwrap_or(vy);
            let dx = (vx + pvx) / 2.0 * dt / 1000.0;
            let dy = (vy + pvy) / 2.0 * dt / 1000.0;
            (prev.previous_x + dx, prev.previous_y + dy)
        }
    };

    sample.set_number(POSITION_X, x);
    sample.set_number(POSITION_Y, y);
    *state = Some(IntegratorState {
        previous: sample.clone(),
        previous_x: x,
        previous_y: y,
    });
    Some(sample)
}

/// Stateful integrator owned by one key's routine
#[derive(Debug, Default)]
pub struct Integrator {
    state: Option<IntegratorState>,
    resets: u64,
}

impl Integrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate one sample, `None` when it is skipped
    pub fn apply(&mut self, sample: Sample) -> Option<Sample> {
        if let Some(prev) = self.state.as_ref() {
            let regressed = prev.has_velocity() && sample.time < prev.previous.time;
            if regressed && sample.has_numbers(&REQUIRED) {
                self.resets += 1;
            }
        }
        integrate(sample, &mut self.state)
    }

    /// Current state, `None` before the first valid sample
    pub fn state(&self) -> Option<&IntegratorState> {
        self.state.as_ref()
    }

    /// Number of time regressions that reset the origin
    pub fn resets(&self) -> u64 {
        self.resets
    }
}
