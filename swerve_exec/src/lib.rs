//! # Swerve library.
//!
//! Trajectory planning and execution for a four wheel independently steered (swerve) drivetrain.
//! The library is split into planning (splines, path sampling, timing) which runs once per motion
//! request, and execution (reference control, wheel setpoint generation) which runs every control
//! cycle.

// ---------------------------------------------------------------------------
// MACROS
// ---------------------------------------------------------------------------

/// Assert that two floating point values are within a tolerance of each other.
#[cfg(test)]
macro_rules! assert_near {
    ($a:expr, $b:expr, $tol:expr) => {{
        let (a, b, tol): (f64, f64, f64) = ($a, $b, $tol);
        assert!(
            (a - b).abs() <= tol,
            "assertion failed: |{} - {}| = {} > {}",
            a,
            b,
            (a - b).abs(),
            tol
        );
    }};
}

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// External interfaces - the pose source, clock and actuators the controller runs against
pub mod ext;

/// Geometry - planar poses, velocities and motion directions
pub mod geom;

/// Kinodynamics - drivetrain limits and wheel kinematics
pub mod kinodynamics;

/// Path - samples splines into a sequence of poses with arc length
pub mod path;

/// Reference control - follows a trajectory using feedforward and feedback
pub mod ref_ctrl;

/// Wheel setpoint generation - turns body velocities into limited wheel commands
pub mod setpoint_gen;

/// Simulation - a simple simulated drivetrain
pub mod sim;

/// Splines - smooth holonomic curves between waypoints
pub mod spline;

/// Timing - constraints and the velocity schedule generator
pub mod timing;

/// Trajectory - time parameterised paths and the cursor used to follow them
pub mod trajectory;
