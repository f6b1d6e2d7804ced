//! # Reference controllers module
//!
//! The full state controller used to follow the reference, plus the wheel alignment check used
//! before driving.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::Params;
use crate::geom::{PlanarVelocity, SwerveModel};
use crate::kinodynamics::{SwerveKinodynamics, NUM_WHEELS, STATIONARY_SPEED_MS};
use util::maths::get_ang_dist;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Feedforward plus proportional feedback on position, heading and optionally velocity.
#[derive(Debug, Serialize, Clone, Copy)]
pub struct FullStateController {
    position_k_p: f64,
    heading_k_p: f64,
    velocity_k_p: f64,
    omega_k_p: f64,
}

/// The output of the full state controller for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerOutput {
    /// Field relative velocity demand.
    pub velocity: PlanarVelocity,

    /// Position of the reference relative to the measurement, in the field frame.
    ///
    /// Units: meters
    pub position_error_m: Vector2<f64>,

    /// Shortest angle from the measured heading to the reference heading.
    ///
    /// Units: radians
    pub heading_error_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FullStateController {
    /// Create a new controller with the gains from the parameters.
    pub fn new(params: &Params) -> Self {
        Self {
            position_k_p: params.position_k_p,
            heading_k_p: params.heading_k_p,
            velocity_k_p: params.velocity_k_p,
            omega_k_p: params.omega_k_p,
        }
    }

    /// Calculate the field relative velocity demand.
    ///
    /// The feedforward is the velocity of `next`, the reference one cycle ahead, and the feedback
    /// acts on the error between `current` and the measurement.
    pub fn calculate(
        &self,
        measurement: &SwerveModel,
        current: &SwerveModel,
        next: &SwerveModel,
    ) -> ControllerOutput {
        let position_error_m = current.pose.position_m - measurement.pose.position_m;
        let heading_error_rad =
            get_ang_dist(measurement.pose.heading_rad, current.pose.heading_rad);

        let feedback = PlanarVelocity::new(
            self.position_k_p * position_error_m[0]
                + self.velocity_k_p * (current.velocity.x_ms - measurement.velocity.x_ms),
            self.position_k_p * position_error_m[1]
                + self.velocity_k_p * (current.velocity.y_ms - measurement.velocity.y_ms),
            self.heading_k_p * heading_error_rad
                + self.omega_k_p * (current.velocity.theta_rads - measurement.velocity.theta_rads),
        );

        ControllerOutput {
            velocity: next.velocity.plus(&feedback),
            position_error_m,
            heading_error_rad,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// True if every wheel which would move under `body_velocity` is within `tolerance_rad` of the
/// angle it needs, or of the opposite angle.
pub fn wheels_aligned(
    kino: &SwerveKinodynamics,
    body_velocity: &PlanarVelocity,
    measured_angles_rad: &[f64; NUM_WHEELS],
    tolerance_rad: f64,
) -> bool {
    kino.to_wheel_vectors(body_velocity)
        .iter()
        .zip(measured_angles_rad.iter())
        .all(|(v, measured)| {
            if v.norm() < STATIONARY_SPEED_MS {
                return true;
            }

            let error = get_ang_dist(*measured, v[1].atan2(v[0])).abs();
            error.min(std::f64::consts::PI - error) <= tolerance_rad
        })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Pose;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn params() -> Params {
        Params {
            position_k_p: 2.0,
            heading_k_p: 3.0,
            velocity_k_p: 0.0,
            omega_k_p: 0.0,
            steer_tolerance_rad: 0.05,
            cycle_period_s: 0.02,
            profile_done_check: false,
        }
    }

    fn model(x: f64, y: f64, heading: f64, vx: f64) -> SwerveModel {
        SwerveModel::new(Pose::new(x, y, heading), PlanarVelocity::new(vx, 0.0, 0.0))
    }

    #[test]
    fn test_feedforward_only() {
        let ctrl = FullStateController::new(&params());

        let out = ctrl.calculate(
            &model(1.0, 2.0, 0.5, 0.0),
            &model(1.0, 2.0, 0.5, 0.9),
            &model(1.1, 2.0, 0.5, 1.0),
        );

        assert_eq!(out.velocity, PlanarVelocity::new(1.0, 0.0, 0.0));
        assert_eq!(out.heading_error_rad, 0.0);
        assert_eq!(out.position_error_m.norm(), 0.0);
    }

    #[test]
    fn test_feedback() {
        let ctrl = FullStateController::new(&params());
        let reference = model(1.0, 0.0, PI - 0.05, 0.0);

        let out = ctrl.calculate(&model(0.9, 0.1, -PI + 0.05, 0.0), &reference, &reference);

        assert_near!(out.velocity.x_ms, 0.2, 1e-12);
        assert_near!(out.velocity.y_ms, -0.2, 1e-12);

        // The heading error goes the short way across the wrap
        assert_near!(out.heading_error_rad, -0.1, 1e-12);
        assert_near!(out.velocity.theta_rads, -0.3, 1e-12);
    }

    #[test]
    fn test_velocity_gains() {
        let mut p = params();
        p.velocity_k_p = 0.5;
        p.omega_k_p = 1.0;
        let ctrl = FullStateController::new(&p);

        let measured = SwerveModel::new(Pose::default(), PlanarVelocity::new(0.0, 0.0, 0.2));
        let current = SwerveModel::new(Pose::default(), PlanarVelocity::new(1.0, 0.0, 0.0));

        let out = ctrl.calculate(&measured, &current, &current);
        assert_near!(out.velocity.x_ms, 1.5, 1e-12);
        assert_near!(out.velocity.theta_rads, -0.2, 1e-12);
    }

    #[test]
    fn test_wheels_aligned() {
        let kino = SwerveKinodynamics::for_test();
        let forward = PlanarVelocity::new(1.0, 0.0, 0.0);

        assert!(wheels_aligned(&kino, &forward, &[0.0; NUM_WHEELS], 0.05));
        assert!(wheels_aligned(&kino, &forward, &[0.04; NUM_WHEELS], 0.05));
        assert!(!wheels_aligned(&kino, &forward, &[0.1; NUM_WHEELS], 0.05));

        // Backwards wheels are fine too
        assert!(wheels_aligned(&kino, &forward, &[PI; NUM_WHEELS], 0.05));
        assert!(!wheels_aligned(&kino, &forward, &[FRAC_PI_2; NUM_WHEELS], 0.05));

        // Nothing moves so anything is aligned
        assert!(wheels_aligned(
            &kino,
            &PlanarVelocity::zero(),
            &[FRAC_PI_2; NUM_WHEELS],
            0.05
        ));
    }
}
