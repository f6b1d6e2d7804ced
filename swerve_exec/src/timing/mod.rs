//! # Timing module
//!
//! Assigns a time, velocity and acceleration to every sample of a path so that the motion honours
//! the drivetrain's limits. Limits are expressed as [`TimingConstraint`]s, normally built from one
//! of the named presets, and the [`ScheduleGenerator`] turns a path and a constraint set into a
//! trajectory.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod constraints;
pub mod presets;
pub mod schedule;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
pub use constraints::*;
pub use presets::*;
pub use schedule::*;
use crate::geom::PoseWithMotion;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A path sample together with when the vehicle reaches it and how it is moving along the path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TimedPose {
    pub pose: PoseWithMotion,

    /// Arc length from the start of the path.
    ///
    /// Units: meters
    pub distance_m: f64,

    /// Time from the start of the trajectory.
    ///
    /// Units: seconds
    pub time_s: f64,

    /// Velocity along the path.
    ///
    /// Units: meters/second
    pub velocity_ms: f64,

    /// Acceleration along the path, constant until the next sample.
    ///
    /// Units: meters/second^2
    pub accel_ms2: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors in the timing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Constraint scale {name} must be in (0, 1] but was {value}")]
    ScaleOutOfRange { name: &'static str, value: f64 },
}

/// Errors that can occur while generating a schedule.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Nothing limits the velocity at path sample {index}")]
    Unbounded { index: usize },

    #[error("The schedule stalls at zero velocity after path sample {index}")]
    Stalled { index: usize },

    #[error(
        "Boundary velocities must be finite and non-negative, got start {start_ms} m/s and end \
         {end_ms} m/s"
    )]
    InvalidBoundaryVelocity { start_ms: f64, end_ms: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TimedPose {
    /// A timed pose at rest.
    pub fn at_rest(pose: PoseWithMotion, distance_m: f64, time_s: f64) -> Self {
        Self {
            pose,
            distance_m,
            time_s,
            velocity_ms: 0.0,
            accel_ms2: 0.0,
        }
    }

    /// Linearly interpolate every quantity, with heading along the shortest arc.
    pub fn interpolate(&self, other: &TimedPose, s: f64) -> TimedPose {
        TimedPose {
            pose: self.pose.interpolate(&other.pose, s),
            distance_m: util::maths::interpolate(self.distance_m, other.distance_m, s),
            time_s: util::maths::interpolate(self.time_s, other.time_s, s),
            velocity_ms: util::maths::interpolate(self.velocity_ms, other.velocity_ms, s),
            accel_ms2: util::maths::interpolate(self.accel_ms2, other.accel_ms2, s),
        }
    }
}
