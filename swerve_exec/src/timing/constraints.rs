//! Timing constraints
//!
//! Each constraint bounds the velocity and acceleration along the path at a single sample. They
//! hold no state, so the same constraint can be shared between any number of schedules.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use crate::geom::{PlanarVelocity, PoseWithMotion};
use crate::kinodynamics::SwerveKinodynamics;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Rates under which a constraint is considered inactive.
const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A limit on the motion along a path.
pub trait TimingConstraint: std::fmt::Debug + Send + Sync {
    /// Maximum velocity along the path at the sample, the allowed range is `[0, max]`. Returns
    /// infinity if the constraint does not limit velocity here.
    ///
    /// Units: meters/second
    fn max_velocity(&self, sample: &PoseWithMotion) -> f64;

    /// Allowed acceleration along the path at the sample when moving at `velocity_ms`.
    ///
    /// Units: meters/second^2
    fn accel_limits(&self, sample: &PoseWithMotion, velocity_ms: f64) -> MinMax;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An acceleration range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

/// Fixed limits on velocity and acceleration.
#[derive(Debug, Clone, Copy)]
pub struct ConstantConstraint {
    max_velocity_ms: f64,
    max_accel_ms2: f64,
    max_decel_ms2: f64,
}

/// Keeps the fastest wheel under the drive limits.
///
/// A holonomic drivetrain that is also rotating runs some wheels faster than others, so the
/// path velocity has to come down as the heading rate goes up.
#[derive(Debug, Clone, Copy)]
pub struct SwerveDriveDynamicsConstraint {
    kino: SwerveKinodynamics,
    velocity_scale: f64,
    accel_scale: f64,
}

/// Limits yaw rate and yaw acceleration.
#[derive(Debug, Clone, Copy)]
pub struct YawRateConstraint {
    max_yaw_rate_rads: f64,
    max_yaw_accel_rads2: f64,
}

/// Limits centripetal acceleration so the vehicle does not tip over in curves.
#[derive(Debug, Clone, Copy)]
pub struct CapsizeAccelerationConstraint {
    max_centripetal_accel_ms2: f64,
}

/// A set of constraints applied together.
#[derive(Debug, Default)]
pub struct ConstraintSet {
    constraints: Vec<Box<dyn TimingConstraint>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MinMax {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Intersection of two ranges. The result may be empty, i.e. `min > max`.
    pub fn intersect(&self, other: &MinMax) -> MinMax {
        MinMax {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

impl ConstantConstraint {
    pub fn new(kino: &SwerveKinodynamics, velocity_scale: f64, accel_scale: f64) -> Self {
        Self {
            max_velocity_ms: velocity_scale * kino.params.max_drive_velocity_ms,
            max_accel_ms2: accel_scale * kino.params.max_drive_accel_ms2,
            max_decel_ms2: accel_scale * kino.params.max_drive_decel_ms2,
        }
    }
}

impl TimingConstraint for ConstantConstraint {
    fn max_velocity(&self, _sample: &PoseWithMotion) -> f64 {
        self.max_velocity_ms
    }

    fn accel_limits(&self, _sample: &PoseWithMotion, _velocity_ms: f64) -> MinMax {
        MinMax::new(-self.max_decel_ms2, self.max_accel_ms2)
    }
}

impl SwerveDriveDynamicsConstraint {
    pub fn new(kino: &SwerveKinodynamics, velocity_scale: f64, accel_scale: f64) -> Self {
        Self {
            kino: *kino,
            velocity_scale,
            accel_scale,
        }
    }

    /// Speed of the fastest wheel when moving along the path at 1 m/s.
    fn fastest_wheel_per_unit_velocity(&self, sample: &PoseWithMotion) -> f64 {
        let dir = sample.body_direction();
        let body_vel = PlanarVelocity::new(dir[0], dir[1], sample.heading_rate_radm);

        self.kino
            .to_wheel_vectors(&body_vel)
            .iter()
            .map(|v| v.norm())
            .fold(0.0, f64::max)
    }
}

impl TimingConstraint for SwerveDriveDynamicsConstraint {
    fn max_velocity(&self, sample: &PoseWithMotion) -> f64 {
        let ratio = self.fastest_wheel_per_unit_velocity(sample);

        if ratio < EPSILON {
            return f64::INFINITY;
        }

        self.velocity_scale * self.kino.params.max_drive_velocity_ms / ratio
    }

    fn accel_limits(&self, sample: &PoseWithMotion, _velocity_ms: f64) -> MinMax {
        let ratio = self.fastest_wheel_per_unit_velocity(sample);

        if ratio < EPSILON {
            return MinMax::unbounded();
        }

        MinMax::new(
            -self.accel_scale * self.kino.params.max_drive_decel_ms2 / ratio,
            self.accel_scale * self.kino.params.max_drive_accel_ms2 / ratio,
        )
    }
}

impl YawRateConstraint {
    pub fn new(kino: &SwerveKinodynamics, scale: f64) -> Self {
        Self {
            max_yaw_rate_rads: scale * kino.max_yaw_rate_rads(),
            max_yaw_accel_rads2: scale * kino.max_yaw_accel_rads2(),
        }
    }
}

impl TimingConstraint for YawRateConstraint {
    fn max_velocity(&self, sample: &PoseWithMotion) -> f64 {
        let heading_rate = sample.heading_rate_radm.abs();

        if heading_rate < EPSILON {
            return f64::INFINITY;
        }

        self.max_yaw_rate_rads / heading_rate
    }

    fn accel_limits(&self, sample: &PoseWithMotion, _velocity_ms: f64) -> MinMax {
        let heading_rate = sample.heading_rate_radm.abs();

        if heading_rate < EPSILON {
            return MinMax::unbounded();
        }

        let limit = self.max_yaw_accel_rads2 / heading_rate;
        MinMax::new(-limit, limit)
    }
}

impl CapsizeAccelerationConstraint {
    pub fn new(kino: &SwerveKinodynamics, scale: f64) -> Self {
        Self {
            max_centripetal_accel_ms2: scale * kino.max_capsize_accel_ms2(),
        }
    }
}

impl TimingConstraint for CapsizeAccelerationConstraint {
    fn max_velocity(&self, sample: &PoseWithMotion) -> f64 {
        let curvature = sample.curvature_m().abs();

        if curvature < EPSILON {
            return f64::INFINITY;
        }

        (self.max_centripetal_accel_ms2 / curvature).sqrt()
    }

    /// The total acceleration is limited, so the tangential part gets whatever the centripetal
    /// part leaves.
    fn accel_limits(&self, sample: &PoseWithMotion, velocity_ms: f64) -> MinMax {
        let centripetal = velocity_ms * velocity_ms * sample.curvature_m().abs();
        let max_sq = self.max_centripetal_accel_ms2 * self.max_centripetal_accel_ms2;
        let remaining_sq = max_sq - centripetal * centripetal;

        if remaining_sq <= 0.0 {
            return MinMax::new(0.0, 0.0);
        }

        let limit = remaining_sq.sqrt();
        MinMax::new(-limit, limit)
    }
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint to the set, builder style.
    pub fn with<C: TimingConstraint + 'static>(mut self, constraint: C) -> Self {
        self.constraints.push(Box::new(constraint));
        self
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl TimingConstraint for ConstraintSet {
    /// Tightest velocity limit of all constraints.
    fn max_velocity(&self, sample: &PoseWithMotion) -> f64 {
        self.constraints
            .iter()
            .map(|c| c.max_velocity(sample))
            .fold(f64::INFINITY, f64::min)
    }

    /// Intersection of the acceleration ranges of all constraints.
    fn accel_limits(&self, sample: &PoseWithMotion, velocity_ms: f64) -> MinMax {
        self.constraints
            .iter()
            .map(|c| c.accel_limits(sample, velocity_ms))
            .fold(MinMax::unbounded(), |acc, r| acc.intersect(&r))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
