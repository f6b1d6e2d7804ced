//! Reference control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for reference control
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Params {
    /// Position controller proportional gain
    ///
    /// Units: 1/seconds
    pub position_k_p: f64,

    /// Heading controller proportional gain
    ///
    /// Units: 1/seconds
    pub heading_k_p: f64,

    /// Translational velocity controller proportional gain
    #[serde(default)]
    pub velocity_k_p: f64,

    /// Rotational velocity controller proportional gain
    #[serde(default)]
    pub omega_k_p: f64,

    /// Largest difference between measured and desired wheel angles for the wheels to be
    /// considered aligned. Wheels pointing the opposite way are also aligned.
    ///
    /// Units: radians
    pub steer_tolerance_rad: f64,

    /// Nominal control cycle period, the look ahead used when previewing the trajectory.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// If true the controller is only done once the actuators have also finished their motion
    /// profiles, otherwise it is done as soon as the trajectory has been followed to the end.
    #[serde(default)]
    pub profile_done_check: bool,
}
