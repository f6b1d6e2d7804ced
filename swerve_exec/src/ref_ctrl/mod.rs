//! # Reference control module
//!
//! Follows a trajectory. Each cycle the reference is sampled, a feedforward plus feedback field
//! relative velocity is computed and turned into wheel setpoints by the setpoint generator.
//!
//! The controller starts by steering the wheels to the direction of the first motion without
//! driving, and only starts moving along the trajectory once the wheels are aligned.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod controllers;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::*;
pub use params::*;
pub use state::*;
use crate::geom::SwerveModel;
use crate::setpoint_gen::SetpointGenError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during reference control.
#[derive(Debug, thiserror::Error)]
pub enum RefCtrlError {
    #[error("Reference control parameter {0} is invalid: {1}")]
    InvalidParam(&'static str, f64),

    #[error("Cannot follow an empty trajectory")]
    EmptyTrajectory,

    /// The measured state or the clock was not finite, so it is not safe to actuate.
    #[error("Invalid vehicle state at time {now_s}: {state:?}")]
    InvalidState { now_s: f64, state: SwerveModel },

    #[error("Wheel setpoint generator error: {0}")]
    SetpointGen(#[from] SetpointGenError),
}
