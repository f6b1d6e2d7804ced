//! Trajectory maker
//!
//! Runs the whole planning pipeline: waypoints are joined into a smoothed spline chain, sampled
//! into a path and then scheduled under the configured constraint preset.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::Deserialize;

// Internal
use super::{Trajectory, TrajectoryError};
use crate::geom::{Pose, SwerveModel, Waypoint};
use crate::kinodynamics::SwerveKinodynamics;
use crate::path::{parameterise_splines, SamplerParams};
use crate::spline::smooth_chain;
use crate::timing::{ConstraintPreset, ScheduleGenerator};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest heading change accepted on a segment which does not translate.
///
/// Units: radians
const MAX_STATIONARY_DHEADING_RAD: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the trajectory planner, normally loaded from `traj_planner.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PlannerParams {
    /// The constraint preset used to schedule every trajectory.
    pub preset: ConstraintPreset,

    /// Sampling tolerances.
    #[serde(default)]
    pub sampler: SamplerParams,
}

/// Makes trajectories through waypoints.
#[derive(Debug, Clone)]
pub struct TrajectoryMaker {
    generator: ScheduleGenerator,
    sampler: SamplerParams,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajectoryMaker {
    pub fn new(kino: &SwerveKinodynamics, params: &PlannerParams) -> Result<Self, TrajectoryError> {
        params.sampler.validate()?;

        Ok(Self {
            generator: ScheduleGenerator::new(params.preset.build(kino)?),
            sampler: params.sampler,
        })
    }

    pub fn generator(&self) -> &ScheduleGenerator {
        &self.generator
    }

    /// Make a trajectory through the waypoints, starting at `start_ms` and finishing at `end_ms`
    /// along the path.
    ///
    /// The schedule is indexed by distance, so a segment that turns on the spot cannot be timed.
    /// A waypoint that only changes heading from the previous one is rejected with
    /// [`TrajectoryError::RotationInPlace`].
    pub fn through(
        &self,
        waypoints: &[Waypoint],
        start_ms: f64,
        end_ms: f64,
    ) -> Result<Trajectory, TrajectoryError> {
        let (chain, report) = smooth_chain(waypoints)?;

        for (segment, spline) in chain.iter().enumerate() {
            let dheading_rad = spline.end().heading_rad - spline.start().heading_rad;
            if spline.is_stationary() && dheading_rad.abs() > MAX_STATIONARY_DHEADING_RAD {
                return Err(TrajectoryError::RotationInPlace {
                    segment,
                    dheading_rad,
                });
            }
        }

        if !report.converged {
            warn!(
                "Spline smoothing did not converge after {} iterations, worst curvature mismatch \
                 {:.4} 1/m",
                report.iterations, report.max_mismatch_m
            );
        }

        let path = parameterise_splines(&chain, &self.sampler)?;
        let traj = self.generator.generate(&path, start_ms, end_ms)?;

        debug!(
            "Made a trajectory through {} waypoints: {} points, {:.3} m in {:.3} s",
            waypoints.len(),
            traj.len(),
            path.length_m(),
            traj.duration_s()
        );

        Ok(traj)
    }

    /// Make a trajectory which starts and ends at rest.
    pub fn rest_to_rest(&self, start: Pose, end: Pose) -> Result<Trajectory, TrajectoryError> {
        self.through(&[Waypoint::new(start), Waypoint::new(end)], 0.0, 0.0)
    }

    /// Make a trajectory from a moving vehicle to rest at `end`.
    ///
    /// The first segment leaves along the vehicle's current course, so there is no sudden change
    /// in direction at the start.
    pub fn moving_to_rest(
        &self,
        state: &SwerveModel,
        end: Pose,
    ) -> Result<Trajectory, TrajectoryError> {
        let start = match state.velocity.course() {
            Some(course) => Waypoint::with_course(state.pose, course),
            None => Waypoint::new(state.pose),
        };

        self.through(&[start, Waypoint::new(end)], state.velocity.norm(), 0.0)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
