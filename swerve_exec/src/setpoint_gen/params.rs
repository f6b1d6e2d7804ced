//! Parameters structure for the wheel setpoint generator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the wheel setpoint generator.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Params {
    /// Apply the drive acceleration limiter.
    pub limit_drive_accel: bool,

    /// Apply the steering slew rate limit.
    pub limit_steer_rate: bool,

    /// Longest cycle period used when limiting, so that a long gap between cycles cannot release
    /// the limits in one step.
    ///
    /// Units: seconds
    pub max_cycle_period_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            limit_drive_accel: true,
            limit_steer_rate: true,
            max_cycle_period_s: 0.1,
        }
    }
}
