//! Holonomic spline segment
//!
//! A segment is made of three quintic polynomials over the parameter `t` in [0, 1]: one each for
//! X and Y, and one for the heading. Heading is independent of the direction of travel, which is
//! what makes the spline holonomic.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;

// Internal
use super::SplineError;
use crate::geom::{MotionDirection, Pose, PoseWithMotion, Waypoint};
use util::maths::{get_ang_dist, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Endpoint tangent magnitude as a multiple of the chord length.
pub const TANGENT_SCALE: f64 = 1.2;

/// Endpoint courses closer than this to pi apart are treated as anti-parallel.
///
/// Units: radians
pub const ANTI_PARALLEL_TOLERANCE_RAD: f64 = 1e-6;

/// Lengths and derivative magnitudes under this value are treated as zero.
pub const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Quintic polynomial `a t^5 + b t^4 + c t^3 + d t^2 + e t + f`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quintic {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

/// The boundary conditions at one end of a segment.
///
/// Heading is stored unwrapped so that a chain of segments can carry a continuous heading through
/// any number of turns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Knot {
    /// Position.
    pub pos_m: Vector2<f64>,

    /// First derivative of position with respect to the parameter.
    pub d_m: Vector2<f64>,

    /// Second derivative of position with respect to the parameter.
    pub dd_m: Vector2<f64>,

    /// Unwrapped heading.
    pub heading_rad: f64,

    /// First derivative of heading with respect to the parameter.
    pub dheading_rad: f64,

    /// Second derivative of heading with respect to the parameter.
    pub ddheading_rad: f64,
}

/// A single holonomic spline segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HolonomicSpline {
    start: Knot,
    end: Knot,

    x: Quintic,
    y: Quintic,
    heading: Quintic,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Quintic {
    /// Build the quintic hermite polynomial matching value, first and second derivative at both
    /// ends.
    pub fn hermite(x0: f64, dx0: f64, ddx0: f64, x1: f64, dx1: f64, ddx1: f64) -> Self {
        Self {
            a: -6.0 * x0 - 3.0 * dx0 - 0.5 * ddx0 + 0.5 * ddx1 - 3.0 * dx1 + 6.0 * x1,
            b: 15.0 * x0 + 8.0 * dx0 + 1.5 * ddx0 - ddx1 + 7.0 * dx1 - 15.0 * x1,
            c: -10.0 * x0 - 6.0 * dx0 - 1.5 * ddx0 + 0.5 * ddx1 - 4.0 * dx1 + 10.0 * x1,
            d: 0.5 * ddx0,
            e: dx0,
            f: x0,
        }
    }

    pub fn value(&self, t: f64) -> f64 {
        ((((self.a * t + self.b) * t + self.c) * t + self.d) * t + self.e) * t + self.f
    }

    pub fn deriv(&self, t: f64) -> f64 {
        (((5.0 * self.a * t + 4.0 * self.b) * t + 3.0 * self.c) * t + 2.0 * self.d) * t + self.e
    }

    pub fn deriv2(&self, t: f64) -> f64 {
        ((20.0 * self.a * t + 12.0 * self.b) * t + 6.0 * self.c) * t + 2.0 * self.d
    }

    pub fn deriv3(&self, t: f64) -> f64 {
        (60.0 * self.a * t + 24.0 * self.b) * t + 6.0 * self.c
    }
}

impl HolonomicSpline {
    /// Build a segment between two waypoints.
    ///
    /// The course at each end is taken from the waypoint if given, otherwise it is the direction
    /// of the chord. Tangent magnitudes are `TANGENT_SCALE` times the chord length and the second
    /// derivatives are zero. The heading changes by the shortest arc, with endpoint rates equal to
    /// the total change so that a pure rotation has a constant rate.
    ///
    /// Coincident waypoints produce a stationary segment, which only rotates.
    pub fn from_waypoints(start: &Waypoint, end: &Waypoint) -> Result<Self, SplineError> {
        if !start.pose.is_finite()
            || !end.pose.is_finite()
            || start.course_rad.map_or(false, |c| !c.is_finite())
            || end.course_rad.map_or(false, |c| !c.is_finite())
        {
            return Err(SplineError::NonFinite);
        }

        let chord_m = start.pose.distance_to(&end.pose);
        let dheading_rad = get_ang_dist(start.pose.heading_rad, end.pose.heading_rad);

        let (d0, d1) = match start.pose.bearing_to(&end.pose) {
            Some(bearing) => {
                let course0 = start.course_rad.unwrap_or(bearing);
                let course1 = end.course_rad.unwrap_or(bearing);

                if (get_ang_dist(course0, course1).abs() - std::f64::consts::PI).abs()
                    < ANTI_PARALLEL_TOLERANCE_RAD
                {
                    return Err(SplineError::AntiParallel { course0, course1 });
                }

                let mag = TANGENT_SCALE * chord_m;
                (
                    Vector2::new(course0.cos(), course0.sin()) * mag,
                    Vector2::new(course1.cos(), course1.sin()) * mag,
                )
            }
            None => (Vector2::zeros(), Vector2::zeros()),
        };

        Ok(Self::from_knots(
            Knot {
                pos_m: start.pose.position_m,
                d_m: d0,
                dd_m: Vector2::zeros(),
                heading_rad: start.pose.heading_rad,
                dheading_rad,
                ddheading_rad: 0.0,
            },
            Knot {
                pos_m: end.pose.position_m,
                d_m: d1,
                dd_m: Vector2::zeros(),
                heading_rad: start.pose.heading_rad + dheading_rad,
                dheading_rad,
                ddheading_rad: 0.0,
            },
        ))
    }

    /// Build a segment from explicit boundary conditions.
    pub fn from_knots(start: Knot, end: Knot) -> Self {
        Self {
            start,
            end,
            x: Quintic::hermite(
                start.pos_m[0],
                start.d_m[0],
                start.dd_m[0],
                end.pos_m[0],
                end.d_m[0],
                end.dd_m[0],
            ),
            y: Quintic::hermite(
                start.pos_m[1],
                start.d_m[1],
                start.dd_m[1],
                end.pos_m[1],
                end.d_m[1],
                end.dd_m[1],
            ),
            heading: Quintic::hermite(
                start.heading_rad,
                start.dheading_rad,
                start.ddheading_rad,
                end.heading_rad,
                end.dheading_rad,
                end.ddheading_rad,
            ),
        }
    }

    pub fn start(&self) -> &Knot {
        &self.start
    }

    pub fn end(&self) -> &Knot {
        &self.end
    }

    /// True if the segment does not translate at all.
    pub fn is_stationary(&self) -> bool {
        (self.end.pos_m - self.start.pos_m).norm() < EPSILON
            && self.start.d_m.norm() < EPSILON
            && self.end.d_m.norm() < EPSILON
    }

    pub fn point(&self, t: f64) -> Vector2<f64> {
        Vector2::new(self.x.value(t), self.y.value(t))
    }

    /// First derivative of position with respect to the parameter.
    pub fn velocity(&self, t: f64) -> Vector2<f64> {
        Vector2::new(self.x.deriv(t), self.y.deriv(t))
    }

    pub fn acceleration(&self, t: f64) -> Vector2<f64> {
        Vector2::new(self.x.deriv2(t), self.y.deriv2(t))
    }

    pub fn jerk(&self, t: f64) -> Vector2<f64> {
        Vector2::new(self.x.deriv3(t), self.y.deriv3(t))
    }

    /// Heading wrapped into (-pi, pi].
    pub fn heading(&self, t: f64) -> f64 {
        wrap_pi(self.heading.value(t))
    }

    /// Unwrapped heading, continuous along a smoothed chain.
    pub fn heading_unwrapped(&self, t: f64) -> f64 {
        self.heading.value(t)
    }

    /// Rate of change of heading with respect to the parameter.
    pub fn heading_rate(&self, t: f64) -> f64 {
        self.heading.deriv(t)
    }

    pub fn heading_accel(&self, t: f64) -> f64 {
        self.heading.deriv2(t)
    }

    /// Signed curvature of the path, zero where the path does not move.
    pub fn curvature(&self, t: f64) -> f64 {
        let d = self.velocity(t);
        let dd = self.acceleration(t);
        let speed = d.norm();

        if speed < EPSILON {
            return 0.0;
        }

        (d[0] * dd[1] - dd[0] * d[1]) / (speed * speed * speed)
    }

    /// Rate of change of curvature with respect to arc length.
    pub fn dcurvature_ds(&self, t: f64) -> f64 {
        let d = self.velocity(t);
        let dd = self.acceleration(t);
        let ddd = self.jerk(t);
        let speed_sq = d.norm_squared();

        if speed_sq < EPSILON * EPSILON {
            return 0.0;
        }

        let num = (d[0] * ddd[1] - ddd[0] * d[1]) * speed_sq
            - 3.0 * (d[0] * dd[0] + d[1] * dd[1]) * (d[0] * dd[1] - dd[0] * d[1]);

        num / (speed_sq * speed_sq * speed_sq)
    }

    pub fn pose(&self, t: f64) -> Pose {
        Pose {
            position_m: self.point(t),
            heading_rad: self.heading(t),
        }
    }

    /// Pose plus the direction of travel, curvature and heading rate per meter at `t`.
    ///
    /// Where the segment does not translate the direction and heading rate are zero.
    pub fn pose_with_motion(&self, t: f64) -> PoseWithMotion {
        let d = self.velocity(t);
        let speed = d.norm();

        if speed < EPSILON {
            return PoseWithMotion::new(self.pose(t), MotionDirection::default(), 0.0);
        }

        PoseWithMotion::new(
            self.pose(t),
            MotionDirection::new(
                d[0] / speed,
                d[1] / speed,
                self.curvature(t),
                self.dcurvature_ds(t),
            ),
            self.heading_rate(t) / speed,
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
