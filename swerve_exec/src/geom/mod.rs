//! # Geometry module
//!
//! Planar value types shared by every stage of planning and execution. All types in this module
//! are immutable `Copy` values.
//!
//! Angles follow the right hand rule about +Z (anticlockwise positive) and headings are always
//! wrapped into (-pi, pi].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

// Internal
use util::maths::{get_ang_dist, interpolate, wrap_pi};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A 2D pose, the position and heading of the vehicle in the field frame.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the field frame.
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Heading, the direction the vehicle body faces, in (-pi, pi].
    ///
    /// Units: radians
    pub heading_rad: f64,
}

/// A planar velocity, either body or field relative depending on context.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanarVelocity {
    /// Velocity along X.
    ///
    /// Units: meters/second
    pub x_ms: f64,

    /// Velocity along Y.
    ///
    /// Units: meters/second
    pub y_ms: f64,

    /// Rotation rate about Z.
    ///
    /// Units: radians/second
    pub theta_rads: f64,
}

/// The direction of travel at a point on a path.
///
/// Holonomic vehicles can move in a direction that differs from the way they face, so this is
/// kept separate from the heading in [`Pose`].
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionDirection {
    /// X component of the unit tangent of travel in the field frame.
    pub dx: f64,

    /// Y component of the unit tangent of travel in the field frame.
    pub dy: f64,

    /// Curvature of the path, positive for turns to the left.
    ///
    /// Units: 1/meters
    pub curvature_m: f64,

    /// Rate of change of curvature with respect to arc length.
    ///
    /// Units: 1/meters^2
    pub dcurvature_ds_m2: f64,
}

/// A pose together with the motion through it, the per-sample geometry of a path.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseWithMotion {
    pub pose: Pose,

    pub direction: MotionDirection,

    /// Rate of change of heading per unit distance travelled.
    ///
    /// Units: radians/meter
    pub heading_rate_radm: f64,
}

/// A waypoint used to build splines.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    /// The pose the vehicle shall pass through.
    pub pose: Pose,

    /// The direction of travel through the waypoint. If `None` the direction is inferred from
    /// the neighbouring waypoints.
    ///
    /// Units: radians
    #[serde(default)]
    pub course_rad: Option<f64>,
}

/// The state of the vehicle as reported by the pose estimator.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwerveModel {
    pub pose: Pose,

    /// Field relative velocity.
    pub velocity: PlanarVelocity,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, wrapping the heading into (-pi, pi].
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad: wrap_pi(heading_rad),
        }
    }

    pub fn x(&self) -> f64 {
        self.position_m[0]
    }

    pub fn y(&self) -> f64 {
        self.position_m[1]
    }

    /// Return true if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().all(|v| v.is_finite()) && self.heading_rad.is_finite()
    }

    /// Euclidian distance between the positions of two poses.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (other.position_m - self.position_m).norm()
    }

    /// Direction of the straight line from this pose to `other`, or `None` if they are
    /// coincident.
    pub fn bearing_to(&self, other: &Pose) -> Option<f64> {
        let diff = other.position_m - self.position_m;

        if diff.norm() <= f64::EPSILON {
            None
        } else {
            Some(diff[1].atan2(diff[0]))
        }
    }

    /// Interpolate between two poses.
    ///
    /// Position is interpolated linearly and heading along the shortest arc.
    pub fn interpolate(&self, other: &Pose, s: f64) -> Pose {
        Pose {
            position_m: self.position_m + (other.position_m - self.position_m) * s,
            heading_rad: wrap_pi(
                self.heading_rad + get_ang_dist(self.heading_rad, other.heading_rad) * s,
            ),
        }
    }
}

impl PlanarVelocity {
    pub fn new(x_ms: f64, y_ms: f64, theta_rads: f64) -> Self {
        Self {
            x_ms,
            y_ms,
            theta_rads,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Translational speed.
    pub fn norm(&self) -> f64 {
        self.x_ms.hypot(self.y_ms)
    }

    /// Direction of translation, or `None` if not translating.
    pub fn course(&self) -> Option<f64> {
        if self.norm() <= 1e-9 {
            None
        } else {
            Some(self.y_ms.atan2(self.x_ms))
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x_ms.is_finite() && self.y_ms.is_finite() && self.theta_rads.is_finite()
    }

    /// Rotate the translational part of the velocity by the given angle.
    ///
    /// Converting a field relative velocity to body relative is a rotation by minus the heading.
    pub fn rotate_by(&self, angle_rad: f64) -> Self {
        let v = Rotation2::new(angle_rad) * Vector2::new(self.x_ms, self.y_ms);

        Self {
            x_ms: v[0],
            y_ms: v[1],
            theta_rads: self.theta_rads,
        }
    }

    /// Convert a field relative velocity into the body frame of a vehicle with the given heading.
    pub fn to_body(&self, heading_rad: f64) -> Self {
        self.rotate_by(-heading_rad)
    }

    pub fn plus(&self, other: &PlanarVelocity) -> Self {
        Self {
            x_ms: self.x_ms + other.x_ms,
            y_ms: self.y_ms + other.y_ms,
            theta_rads: self.theta_rads + other.theta_rads,
        }
    }

    pub fn interpolate(&self, other: &PlanarVelocity, s: f64) -> Self {
        Self {
            x_ms: interpolate(self.x_ms, other.x_ms, s),
            y_ms: interpolate(self.y_ms, other.y_ms, s),
            theta_rads: interpolate(self.theta_rads, other.theta_rads, s),
        }
    }
}

impl MotionDirection {
    pub fn new(dx: f64, dy: f64, curvature_m: f64, dcurvature_ds_m2: f64) -> Self {
        Self {
            dx,
            dy,
            curvature_m,
            dcurvature_ds_m2,
        }
    }

    /// Direction of travel as an angle, or `None` for the zero direction.
    pub fn course(&self) -> Option<f64> {
        if self.dx.hypot(self.dy) <= f64::EPSILON {
            None
        } else {
            Some(self.dy.atan2(self.dx))
        }
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite()
            && self.dy.is_finite()
            && self.curvature_m.is_finite()
            && self.dcurvature_ds_m2.is_finite()
    }
}

impl PoseWithMotion {
    pub fn new(pose: Pose, direction: MotionDirection, heading_rate_radm: f64) -> Self {
        Self {
            pose,
            direction,
            heading_rate_radm,
        }
    }

    pub fn curvature_m(&self) -> f64 {
        self.direction.curvature_m
    }

    /// Direction of travel expressed in the vehicle body frame, as a unit vector.
    pub fn body_direction(&self) -> Vector2<f64> {
        Rotation2::new(-self.pose.heading_rad) * Vector2::new(self.direction.dx, self.direction.dy)
    }

    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.direction.is_finite() && self.heading_rate_radm.is_finite()
    }

    /// Interpolate between two samples, linearly for every term and along the shortest arc for
    /// heading.
    pub fn interpolate(&self, other: &PoseWithMotion, s: f64) -> PoseWithMotion {
        PoseWithMotion {
            pose: self.pose.interpolate(&other.pose, s),
            direction: MotionDirection {
                dx: interpolate(self.direction.dx, other.direction.dx, s),
                dy: interpolate(self.direction.dy, other.direction.dy, s),
                curvature_m: interpolate(
                    self.direction.curvature_m,
                    other.direction.curvature_m,
                    s,
                ),
                dcurvature_ds_m2: interpolate(
                    self.direction.dcurvature_ds_m2,
                    other.direction.dcurvature_ds_m2,
                    s,
                ),
            },
            heading_rate_radm: interpolate(self.heading_rate_radm, other.heading_rate_radm, s),
        }
    }
}

impl Waypoint {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            course_rad: None,
        }
    }

    pub fn with_course(pose: Pose, course_rad: f64) -> Self {
        Self {
            pose,
            course_rad: Some(wrap_pi(course_rad)),
        }
    }
}

impl SwerveModel {
    pub fn new(pose: Pose, velocity: PlanarVelocity) -> Self {
        Self { pose, velocity }
    }

    /// A vehicle at rest at the given pose.
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            pose,
            velocity: PlanarVelocity::zero(),
        }
    }

    /// Build the reference state for a sample with the given path velocity.
    ///
    /// Translation follows the direction of motion and rotation is the heading rate per meter
    /// multiplied by the path velocity.
    pub fn from_sample(sample: &PoseWithMotion, velocity_ms: f64) -> Self {
        Self {
            pose: sample.pose,
            velocity: PlanarVelocity {
                x_ms: sample.direction.dx * velocity_ms,
                y_ms: sample.direction.dy * velocity_ms,
                theta_rads: sample.heading_rate_radm * velocity_ms,
            },
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.velocity.is_finite()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
