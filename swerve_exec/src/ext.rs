//! Interfaces to the world outside the library
//!
//! The reference controller reads the vehicle state and time through these traits and commands
//! the drivetrain through [`SwerveActuators`], so it can run against real hardware or the
//! simulated drive in [`crate::sim`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::geom::SwerveModel;
use crate::kinodynamics::{WheelSetpoint, NUM_WHEELS};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of the current vehicle state, normally the pose estimator.
pub trait PoseSource {
    /// Field relative pose and velocity of the vehicle.
    fn current_state(&self) -> SwerveModel;
}

/// A monotonic clock.
pub trait Clock {
    /// Units: seconds
    fn now(&self) -> f64;
}

/// The swerve modules.
pub trait SwerveActuators {
    /// Command every module.
    fn apply_wheel_setpoints(&mut self, setpoints: &[WheelSetpoint; NUM_WHEELS]);

    /// The measured steer angle of every module.
    ///
    /// Units: radians
    fn measured_angles(&self) -> [f64; NUM_WHEELS];

    /// True once every module has finished its current motion profile.
    fn profile_done(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Clock giving the time since the start of the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Clock for SessionClock {
    /// Time since the start of the session, or NaN if no session has been created.
    fn now(&self) -> f64 {
        util::session::try_get_elapsed_seconds().unwrap_or(f64::NAN)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
