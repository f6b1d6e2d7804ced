//! # Wheel setpoint generator module
//!
//! Turns a desired body relative velocity into the four wheel setpoints actually commanded this
//! cycle, respecting drive motor torque, wheel speed and steering rate limits.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod limiter;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use limiter::*;
pub use params::*;
pub use state::*;
use crate::geom::PlanarVelocity;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur in the setpoint generator.
#[derive(Debug, thiserror::Error)]
pub enum SetpointGenError {
    #[error("The maximum cycle period must be positive and finite but was {0}")]
    InvalidCyclePeriod(f64),

    #[error("Received a non-finite body velocity: {0:?}")]
    NonFiniteVelocity(PlanarVelocity),

    #[error("Received an invalid cycle period: {0}")]
    InvalidPeriod(f64),
}
