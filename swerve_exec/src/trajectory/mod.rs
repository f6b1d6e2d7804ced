//! # Trajectory module
//!
//! A trajectory is a path with timing: an immutable list of [`TimedPose`]s in time order. It can
//! be sampled at any time, and followed with a [`TrajectoryIter`] cursor.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod iter;
pub mod maker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use iter::*;
pub use maker::*;
use crate::geom::SwerveModel;
use crate::path::PathError;
use crate::spline::SplineError;
use crate::timing::{ConfigError, ScheduleError, TimedPose};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A time parameterised path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    points: Vec<TimedPose>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur while making a trajectory.
#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    #[error("Could not build the splines: {0}")]
    Spline(#[from] SplineError),

    #[error("Could not sample the splines: {0}")]
    Path(#[from] PathError),

    #[error("Invalid timing configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not generate the schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error(
        "Segment {segment} only rotates ({dheading_rad:.4} rad), which cannot be scheduled along \
         the path"
    )]
    RotationInPlace { segment: usize, dheading_rad: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Trajectory {
    /// Wrap a list of timed poses, which must be in time order.
    pub fn new(points: Vec<TimedPose>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[TimedPose] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&TimedPose> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TimedPose> {
        self.points.last()
    }

    /// Total duration of the trajectory.
    ///
    /// Units: seconds
    pub fn duration_s(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time_s)
    }

    /// Sample the trajectory at a time, clamped to the trajectory's duration.
    ///
    /// Every quantity is linearly interpolated between the two points either side of `time_s`,
    /// apart from heading which follows the shortest arc. Returns `None` for an empty trajectory.
    pub fn sample(&self, time_s: f64) -> Option<TimedPose> {
        let first = self.points.first()?;
        let last = self.points.last()?;

        if time_s.is_nan() || time_s <= first.time_s {
            return Some(*first);
        }
        if time_s >= last.time_s {
            return Some(*last);
        }

        // Index of the first point at or after time_s, never 0 since time_s > first.time_s
        let idx = self.points.partition_point(|p| p.time_s < time_s);
        let prev = &self.points[idx - 1];
        let next = &self.points[idx];

        let span = next.time_s - prev.time_s;
        if span <= 0.0 {
            return Some(*next);
        }

        Some(prev.interpolate(next, (time_s - prev.time_s) / span))
    }
}

impl SwerveModel {
    /// The reference state of the vehicle at a point of a trajectory.
    pub fn from_timed_pose(timed_pose: &TimedPose) -> Self {
        Self::from_sample(&timed_pose.pose, timed_pose.velocity_ms)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::{MotionDirection, Pose, PoseWithMotion};
    use std::f64::consts::PI;

    fn point(x: f64, heading: f64, time_s: f64, velocity_ms: f64) -> TimedPose {
        TimedPose {
            pose: PoseWithMotion::new(
                Pose::new(x, 0.0, heading),
                MotionDirection::new(1.0, 0.0, 0.0, 0.0),
                0.0,
            ),
            distance_m: x,
            time_s,
            velocity_ms,
            accel_ms2: 0.0,
        }
    }

    fn traj() -> Trajectory {
        Trajectory::new(vec![
            point(0.0, PI - 0.1, 0.0, 0.0),
            point(1.0, -PI + 0.1, 1.0, 2.0),
            point(2.0, -PI + 0.1, 3.0, 0.0),
        ])
    }

    #[test]
    fn test_sample_ends() {
        let t = traj();

        assert_eq!(t.duration_s(), 3.0);
        assert_eq!(t.sample(0.0), t.first().copied());
        assert_eq!(t.sample(3.0), t.last().copied());

        // Outside the trajectory the ends are held
        assert_eq!(t.sample(-1.0), t.first().copied());
        assert_eq!(t.sample(10.0), t.last().copied());

        assert_eq!(Trajectory::default().sample(1.0), None);
    }

    #[test]
    fn test_sample_interpolates() {
        let t = traj();

        let s = t.sample(0.5).unwrap();
        assert_near!(s.pose.pose.x(), 0.5, 1e-12);
        assert_near!(s.velocity_ms, 1.0, 1e-12);
        assert_near!(s.time_s, 0.5, 1e-12);

        // Heading goes the short way through pi
        assert_near!(s.pose.pose.heading_rad.abs(), PI, 1e-12);

        let s = t.sample(2.0).unwrap();
        assert_near!(s.pose.pose.x(), 1.5, 1e-12);
        assert_near!(s.velocity_ms, 1.0, 1e-12);

        // Sampling is idempotent
        assert_eq!(t.sample(1.7), t.sample(1.7));
    }

    #[test]
    fn test_model_from_timed_pose() {
        let model = SwerveModel::from_timed_pose(&point(1.0, 0.3, 1.0, 2.0));

        assert_eq!(model.pose.x(), 1.0);
        assert_eq!(model.velocity.x_ms, 2.0);
        assert_eq!(model.velocity.y_ms, 0.0);
    }
}
