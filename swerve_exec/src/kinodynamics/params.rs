//! Parameters structure for the drivetrain kinodynamics

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Physical limits and geometry of the swerve drivetrain.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Params {
    // ---- CAPABILITIES ----
    /// Maximum speed of a single drive wheel.
    ///
    /// Units: meters/second
    pub max_drive_velocity_ms: f64,

    /// Maximum drive wheel acceleration, set by the motor current limit.
    ///
    /// Units: meters/second^2
    pub max_drive_accel_ms2: f64,

    /// Maximum drive wheel deceleration.
    ///
    /// Units: meters/second^2
    pub max_drive_decel_ms2: f64,

    /// Acceleration available from a stalled drive motor. Available acceleration falls linearly
    /// from this value at rest to zero at the maximum drive velocity (back EMF).
    ///
    /// Units: meters/second^2
    pub stall_accel_ms2: f64,

    /// Maximum steer axis rate.
    ///
    /// Units: radians/second
    pub max_steer_velocity_rads: f64,

    // ---- GEOMETRY ----
    /// Lateral distance between the left and right wheels.
    ///
    /// Units: meters
    pub track_width_m: f64,

    /// Longitudinal distance between the front and rear wheels.
    ///
    /// Units: meters
    pub wheelbase_m: f64,

    /// Height of the centre of gravity above the ground.
    ///
    /// Units: meters
    pub vcg_m: f64,
}
