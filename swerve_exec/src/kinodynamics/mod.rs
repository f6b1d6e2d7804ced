//! # Kinodynamics module
//!
//! Describes what the drivetrain is physically capable of, and converts between body velocities
//! and per-wheel commands.
//!
//! The wheels are always stored in the order front left, front right, rear left, rear right. The
//! body frame has +X forward and +Y to the left, so the wheel positions are:
//!
//! | Wheel | X        | Y       |
//! |-------|----------|---------|
//! | FL    | +L/2     | +W/2    |
//! | FR    | +L/2     | -W/2    |
//! | RL    | -L/2     | +W/2    |
//! | RR    | -L/2     | -W/2    |
//!
//! where L is the wheelbase and W the track width.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
pub use params::*;
use crate::geom::PlanarVelocity;
use util::maths::{get_ang_dist, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of swerve modules on the drivetrain.
pub const NUM_WHEELS: usize = 4;

/// Acceleration due to gravity.
///
/// Units: meters/second^2
pub const GRAVITY_MS2: f64 = 9.81;

/// Wheel speed under which a wheel is considered stationary, and its steer angle is held.
///
/// Units: meters/second
pub const STATIONARY_SPEED_MS: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity of a single wheel's contact point in the body frame.
pub type WheelVector = Vector2<f64>;

/// The command for a single swerve module.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct WheelSetpoint {
    /// Signed drive speed, negative when the wheel is driven backwards.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Steer angle relative to the body +X axis.
    ///
    /// Units: radians
    pub angle_rad: f64,
}

/// The drivetrain limits plus the quantities derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwerveKinodynamics {
    pub params: Params,

    /// Wheel positions in the body frame.
    wheel_pos_m_rb: [Vector2<f64>; NUM_WHEELS],

    /// Distance from the centre of rotation to each wheel.
    drive_radius_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum KinodynamicsError {
    #[error("Kinodynamic parameter {0} must be positive and finite but was {1}")]
    InvalidParam(&'static str, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveKinodynamics {
    /// Build the kinodynamics from a parameter set, checking every limit is positive.
    pub fn new(params: Params) -> Result<Self, KinodynamicsError> {
        let checks = [
            ("max_drive_velocity_ms", params.max_drive_velocity_ms),
            ("max_drive_accel_ms2", params.max_drive_accel_ms2),
            ("max_drive_decel_ms2", params.max_drive_decel_ms2),
            ("stall_accel_ms2", params.stall_accel_ms2),
            ("max_steer_velocity_rads", params.max_steer_velocity_rads),
            ("track_width_m", params.track_width_m),
            ("wheelbase_m", params.wheelbase_m),
            ("vcg_m", params.vcg_m),
        ];

        for &(name, value) in checks.iter() {
            if !value.is_finite() || value <= 0.0 {
                return Err(KinodynamicsError::InvalidParam(name, value));
            }
        }

        Ok(Self::from_params(params))
    }

    /// Limits used throughout the tests: a fast and responsive 0.5 m square drivetrain.
    pub fn for_test() -> Self {
        Self::from_params(Params {
            max_drive_velocity_ms: 5.0,
            max_drive_accel_ms2: 10.0,
            max_drive_decel_ms2: 20.0,
            stall_accel_ms2: 20.0,
            max_steer_velocity_rads: 20.0 * std::f64::consts::PI,
            track_width_m: 0.5,
            wheelbase_m: 0.5,
            vcg_m: 0.3,
        })
    }

    fn from_params(params: Params) -> Self {
        let half_l = params.wheelbase_m / 2.0;
        let half_w = params.track_width_m / 2.0;

        Self {
            params,
            wheel_pos_m_rb: [
                Vector2::new(half_l, half_w),
                Vector2::new(half_l, -half_w),
                Vector2::new(-half_l, half_w),
                Vector2::new(-half_l, -half_w),
            ],
            drive_radius_m: half_l.hypot(half_w),
        }
    }

    /// Distance from the centre of the drivetrain to each wheel.
    pub fn drive_radius_m(&self) -> f64 {
        self.drive_radius_m
    }

    /// Yaw rate reached when every wheel runs at max speed tangentially.
    pub fn max_yaw_rate_rads(&self) -> f64 {
        self.params.max_drive_velocity_ms / self.drive_radius_m
    }

    /// Yaw acceleration reached when every wheel accelerates at the max rate tangentially.
    pub fn max_yaw_accel_rads2(&self) -> f64 {
        self.params.max_drive_accel_ms2 / self.drive_radius_m
    }

    /// Centripetal acceleration at which the vehicle would start to tip over.
    pub fn max_capsize_accel_ms2(&self) -> f64 {
        GRAVITY_MS2 * (self.params.track_width_m / 2.0) / self.params.vcg_m
    }

    /// Acceleration available to a wheel currently moving at `speed_ms`, taking back EMF into
    /// account.
    pub fn available_accel_ms2(&self, speed_ms: f64) -> f64 {
        let back_emf_limited = self.params.stall_accel_ms2
            * (1.0 - speed_ms.abs() / self.params.max_drive_velocity_ms);

        self.params.max_drive_accel_ms2.min(back_emf_limited)
    }

    /// Inverse kinematics, the velocity of each wheel for a body relative velocity.
    pub fn to_wheel_vectors(&self, body_vel: &PlanarVelocity) -> [WheelVector; NUM_WHEELS] {
        let mut vecs = [WheelVector::zeros(); NUM_WHEELS];

        for (v, pos) in vecs.iter_mut().zip(self.wheel_pos_m_rb.iter()) {
            *v = Vector2::new(
                body_vel.x_ms - body_vel.theta_rads * pos[1],
                body_vel.y_ms + body_vel.theta_rads * pos[0],
            );
        }

        vecs
    }

    /// Forward kinematics, the body velocity which best explains the given wheel velocities.
    ///
    /// The wheels are placed symmetrically about the centre so the least squares normal equations
    /// decouple into the mean translation and a weighted mean rotation.
    pub fn to_body_velocity(&self, wheels: &[WheelVector; NUM_WHEELS]) -> PlanarVelocity {
        let mut sum = Vector2::<f64>::zeros();
        let mut moment = 0.0;
        let mut inertia = 0.0;

        for (v, pos) in wheels.iter().zip(self.wheel_pos_m_rb.iter()) {
            sum += v;
            moment += pos[0] * v[1] - pos[1] * v[0];
            inertia += pos.norm_squared();
        }

        let mean = sum / NUM_WHEELS as f64;

        PlanarVelocity {
            x_ms: mean[0],
            y_ms: mean[1],
            theta_rads: moment / inertia,
        }
    }

    /// Scale all wheel vectors uniformly so that none exceeds the max drive velocity.
    pub fn desaturate(&self, wheels: &[WheelVector; NUM_WHEELS]) -> [WheelVector; NUM_WHEELS] {
        let max_speed = wheels.iter().map(|v| v.norm()).fold(0.0, f64::max);

        if max_speed <= self.params.max_drive_velocity_ms {
            return *wheels;
        }

        let scale = self.params.max_drive_velocity_ms / max_speed;
        let mut out = *wheels;
        for v in out.iter_mut() {
            *v *= scale;
        }

        out
    }

    /// Inverse kinematics to optimised wheel setpoints.
    ///
    /// Each wheel is flipped if that is the shorter rotation from its previous angle.
    pub fn to_wheel_setpoints(
        &self,
        body_vel: &PlanarVelocity,
        prev_angles_rad: &[f64; NUM_WHEELS],
    ) -> [WheelSetpoint; NUM_WHEELS] {
        let vecs = self.to_wheel_vectors(body_vel);
        let mut sps = [WheelSetpoint::default(); NUM_WHEELS];

        for i in 0..NUM_WHEELS {
            sps[i] = optimise_setpoint(&vecs[i], prev_angles_rad[i]);
        }

        sps
    }
}

/// Convert a wheel vector into a setpoint that requires the smallest steer rotation from
/// `prev_angle_rad`.
///
/// A target more than pi/2 away is reached by steering to the opposite angle and reversing the
/// drive. Stationary wheels keep their previous angle.
pub fn optimise_setpoint(vec: &WheelVector, prev_angle_rad: f64) -> WheelSetpoint {
    let speed_ms = vec.norm();

    if speed_ms < STATIONARY_SPEED_MS {
        return WheelSetpoint {
            speed_ms: 0.0,
            angle_rad: prev_angle_rad,
        };
    }

    optimise_angle(speed_ms, vec[1].atan2(vec[0]), prev_angle_rad)
}

/// Flip a speed/angle pair if the angle is more than pi/2 away from `prev_angle_rad`.
pub fn optimise_angle(speed_ms: f64, angle_rad: f64, prev_angle_rad: f64) -> WheelSetpoint {
    if get_ang_dist(prev_angle_rad, angle_rad).abs() > std::f64::consts::FRAC_PI_2 {
        WheelSetpoint {
            speed_ms: -speed_ms,
            angle_rad: wrap_pi(angle_rad + std::f64::consts::PI),
        }
    } else {
        WheelSetpoint {
            speed_ms,
            angle_rad: wrap_pi(angle_rad),
        }
    }
}

impl WheelSetpoint {
    /// The wheel's velocity vector in the body frame.
    pub fn to_vector(&self) -> WheelVector {
        Vector2::new(
            self.speed_ms * self.angle_rad.cos(),
            self.speed_ms * self.angle_rad.sin(),
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
