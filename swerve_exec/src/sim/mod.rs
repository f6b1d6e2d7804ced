//! # Simulation module
//!
//! A simple simulated swerve drivetrain. Drive motors follow their speed demand instantly, steer
//! motors slew towards their angle demand at the maximum steer velocity, and the vehicle pose is
//! integrated from the forward kinematics of the wheels.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;

// Internal
use crate::ext::{Clock, PoseSource, SwerveActuators};
use crate::geom::{Pose, SwerveModel};
use crate::kinodynamics::{SwerveKinodynamics, WheelSetpoint, WheelVector, NUM_WHEELS};
use util::maths::{get_ang_dist, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Steer angle error under which a module has finished its profile.
///
/// Units: radians
const STEER_DONE_TOLERANCE_RAD: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A simulated drivetrain, which is also its own pose source and clock.
#[derive(Debug, Clone)]
pub struct SimDrive {
    kino: SwerveKinodynamics,

    state: SwerveModel,

    /// Actual speed and angle of each module.
    wheels: [WheelSetpoint; NUM_WHEELS],

    /// The last demand sent to each module.
    demands: [WheelSetpoint; NUM_WHEELS],

    /// Units: seconds
    time_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimDrive {
    /// A drivetrain at rest at `pose` with every wheel pointing forward.
    pub fn new(kino: SwerveKinodynamics, pose: Pose) -> Self {
        Self {
            kino,
            state: SwerveModel::at_rest(pose),
            wheels: [WheelSetpoint::default(); NUM_WHEELS],
            demands: [WheelSetpoint::default(); NUM_WHEELS],
            time_s: 0.0,
        }
    }

    /// Set the initial wheel angles.
    pub fn with_wheel_angles(mut self, angles_rad: [f64; NUM_WHEELS]) -> Self {
        for i in 0..NUM_WHEELS {
            self.wheels[i].angle_rad = wrap_pi(angles_rad[i]);
            self.demands[i].angle_rad = self.wheels[i].angle_rad;
        }

        self
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    /// The actual state of every module.
    pub fn wheels(&self) -> &[WheelSetpoint; NUM_WHEELS] {
        &self.wheels
    }

    /// Advance the simulation by `dt_s`.
    pub fn step(&mut self, dt_s: f64) {
        if !dt_s.is_finite() || dt_s <= 0.0 {
            return;
        }

        let max_steer_step_rad = self.kino.params.max_steer_velocity_rads * dt_s;
        let mut vectors = [WheelVector::zeros(); NUM_WHEELS];

        for i in 0..NUM_WHEELS {
            let error = get_ang_dist(self.wheels[i].angle_rad, self.demands[i].angle_rad);
            let step = error.max(-max_steer_step_rad).min(max_steer_step_rad);

            self.wheels[i] = WheelSetpoint {
                speed_ms: self.demands[i].speed_ms,
                angle_rad: wrap_pi(self.wheels[i].angle_rad + step),
            };
            vectors[i] = self.wheels[i].to_vector();
        }

        // Rotate into the field frame at the middle of the step
        let body_vel = self.kino.to_body_velocity(&vectors);
        let mid_heading_rad = self.state.pose.heading_rad + 0.5 * body_vel.theta_rads * dt_s;
        let field_vel = body_vel.rotate_by(mid_heading_rad);

        let pose = self.state.pose;
        self.state = SwerveModel::new(
            Pose::new(
                pose.x() + field_vel.x_ms * dt_s,
                pose.y() + field_vel.y_ms * dt_s,
                pose.heading_rad + field_vel.theta_rads * dt_s,
            ),
            field_vel,
        );
        self.time_s += dt_s;

        trace!(
            "Sim at {:.3} s: {:?}, velocity {:?}",
            self.time_s,
            self.state.pose,
            self.state.velocity
        );
    }
}

impl PoseSource for SimDrive {
    fn current_state(&self) -> SwerveModel {
        self.state
    }
}

impl Clock for SimDrive {
    fn now(&self) -> f64 {
        self.time_s
    }
}

impl SwerveActuators for SimDrive {
    fn apply_wheel_setpoints(&mut self, setpoints: &[WheelSetpoint; NUM_WHEELS]) {
        self.demands = *setpoints;
    }

    fn measured_angles(&self) -> [f64; NUM_WHEELS] {
        let mut angles = [0.0; NUM_WHEELS];

        for (a, w) in angles.iter_mut().zip(self.wheels.iter()) {
            *a = w.angle_rad;
        }

        angles
    }

    fn profile_done(&self) -> bool {
        self.wheels.iter().zip(self.demands.iter()).all(|(w, d)| {
            get_ang_dist(w.angle_rad, d.angle_rad).abs() < STEER_DONE_TOLERANCE_RAD
        })
    }
}

impl Default for SimDrive {
    fn default() -> Self {
        Self::new(SwerveKinodynamics::for_test(), Pose::default())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::PlanarVelocity;
    use std::f64::consts::{FRAC_PI_2, PI};

    const DT_S: f64 = 0.01;

    #[test]
    fn test_drive_forward() {
        let mut sim = SimDrive::default();

        sim.apply_wheel_setpoints(&[WheelSetpoint {
            speed_ms: 1.0,
            angle_rad: 0.0,
        }; NUM_WHEELS]);
        assert!(sim.profile_done());

        for _ in 0..100 {
            sim.step(DT_S);
        }

        let state = sim.current_state();
        assert_near!(state.pose.x(), 1.0, 1e-9);
        assert_near!(state.pose.y(), 0.0, 1e-9);
        assert_near!(state.velocity.x_ms, 1.0, 1e-12);
        assert_near!(sim.now(), 1.0, 1e-9);
    }

    #[test]
    fn test_steering_slews() {
        let mut sim = SimDrive::default();

        sim.apply_wheel_setpoints(&[WheelSetpoint {
            speed_ms: 0.0,
            angle_rad: FRAC_PI_2,
        }; NUM_WHEELS]);
        assert!(!sim.profile_done());

        // 20 pi rad/s gives 0.2 pi per step
        sim.step(DT_S);
        for a in sim.measured_angles().iter() {
            assert_near!(*a, 0.2 * PI, 1e-9);
        }
        assert!(!sim.profile_done());

        sim.step(DT_S);
        sim.step(DT_S);
        for a in sim.measured_angles().iter() {
            assert_near!(*a, FRAC_PI_2, 1e-9);
        }
        assert!(sim.profile_done());

        // Nothing moved
        assert_eq!(sim.current_state().pose, Pose::default());
    }

    #[test]
    fn test_rotate_in_place() {
        let kino = SwerveKinodynamics::for_test();
        let mut sim = SimDrive::new(kino, Pose::default());

        let body_vel = PlanarVelocity::new(0.0, 0.0, 1.0);
        let setpoints = kino.to_wheel_setpoints(&body_vel, &[0.0; NUM_WHEELS]);

        let mut angles = [0.0; NUM_WHEELS];
        for i in 0..NUM_WHEELS {
            angles[i] = setpoints[i].angle_rad;
        }
        let mut sim_aligned = sim.clone().with_wheel_angles(angles);

        sim_aligned.apply_wheel_setpoints(&setpoints);
        for _ in 0..50 {
            sim_aligned.step(DT_S);
        }

        let state = sim_aligned.current_state();
        assert_near!(state.pose.heading_rad, 0.5, 1e-9);
        assert_near!(state.pose.x(), 0.0, 1e-9);
        assert_near!(state.pose.y(), 0.0, 1e-9);

        // Zero or negative steps do nothing
        sim.step(0.0);
        sim.step(-1.0);
        assert_eq!(sim.time_s(), 0.0);
    }
}
