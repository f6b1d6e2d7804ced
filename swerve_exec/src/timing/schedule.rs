//! Schedule generator
//!
//! Finds the fastest velocity profile along a path that respects a set of constraints, using a
//! backward pass from the end velocity followed by a forward pass from the start velocity. Time is
//! then integrated assuming constant acceleration between samples.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use std::sync::Arc;

// Internal
use super::{ScheduleError, TimedPose, TimingConstraint};
use crate::path::Path;
use crate::trajectory::Trajectory;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distances under which a segment is treated as having zero length.
///
/// Units: meters
const MIN_SEGMENT_M: f64 = 1e-12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Turns paths into trajectories under a fixed set of constraints.
#[derive(Debug, Clone)]
pub struct ScheduleGenerator {
    constraints: Arc<dyn TimingConstraint>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScheduleGenerator {
    pub fn new<C: TimingConstraint + 'static>(constraints: C) -> Self {
        Self {
            constraints: Arc::new(constraints),
        }
    }

    pub fn constraints(&self) -> &dyn TimingConstraint {
        self.constraints.as_ref()
    }

    /// Generate a trajectory along the path starting at `start_ms` and ending at `end_ms`.
    ///
    /// Boundary velocities above the local limit are reduced to it. Paths with fewer than two
    /// samples or no length give a trajectory holding at most the first sample at rest.
    pub fn generate(
        &self,
        path: &Path,
        start_ms: f64,
        end_ms: f64,
    ) -> Result<Trajectory, ScheduleError> {
        if !start_ms.is_finite() || !end_ms.is_finite() || start_ms < 0.0 || end_ms < 0.0 {
            return Err(ScheduleError::InvalidBoundaryVelocity { start_ms, end_ms });
        }

        let samples = path.samples();

        if samples.len() < 2 || path.length_m() <= MIN_SEGMENT_M {
            return Ok(Trajectory::new(
                samples
                    .first()
                    .map(|s| TimedPose::at_rest(s.pose, s.distance_m, 0.0))
                    .into_iter()
                    .collect(),
            ));
        }

        // Velocity limit at every sample
        let mut bounds = Vec::with_capacity(samples.len());
        for (index, s) in samples.iter().enumerate() {
            let bound = self.constraints.max_velocity(&s.pose);

            if !bound.is_finite() {
                return Err(ScheduleError::Unbounded { index });
            }

            bounds.push(bound.max(0.0));
        }

        let last = samples.len() - 1;

        // Backward pass, the fastest we can go at each sample and still slow down in time.
        //
        // The deceleration over a segment must fit the limits at both of its ends. The limits at
        // the near end depend on the velocity there, so they are evaluated at the velocity
        // reachable under the far end limits. Available deceleration never shrinks as the
        // velocity drops, so the lower velocity this gives also fits.
        let mut velocities = bounds.clone();
        velocities[last] = velocities[last].min(end_ms);

        for i in (0..last).rev() {
            let ds = samples[i + 1].distance_m - samples[i].distance_m;
            let next_v = velocities[i + 1];
            let reachable = |decel: f64| (next_v * next_v + 2.0 * decel.max(0.0) * ds).sqrt();

            let far_decel = -self
                .constraints
                .accel_limits(&samples[i + 1].pose, next_v)
                .min;
            let candidate_v = velocities[i].min(reachable(far_decel));

            let near_decel = -self
                .constraints
                .accel_limits(&samples[i].pose, candidate_v)
                .min;

            velocities[i] = candidate_v.min(reachable(far_decel.min(near_decel)));
        }

        // Forward pass, clamped by the backward pass
        velocities[0] = velocities[0].min(start_ms);

        for i in 1..=last {
            let ds = samples[i].distance_m - samples[i - 1].distance_m;
            let prev_v = velocities[i - 1];
            let accel = self
                .constraints
                .accel_limits(&samples[i - 1].pose, prev_v)
                .max;

            let reachable = (prev_v * prev_v + 2.0 * accel.max(0.0) * ds).sqrt();
            velocities[i] = velocities[i].min(reachable);
        }

        // Time integration
        let mut points = Vec::with_capacity(samples.len());
        let mut time_s = 0.0;

        for i in 0..=last {
            let v = velocities[i];

            let accel_ms2 = if i == last {
                0.0
            } else {
                let ds = samples[i + 1].distance_m - samples[i].distance_m;
                let next_v = velocities[i + 1];

                if ds <= MIN_SEGMENT_M {
                    0.0
                } else {
                    (next_v * next_v - v * v) / (2.0 * ds)
                }
            };

            points.push(TimedPose {
                pose: samples[i].pose,
                distance_m: samples[i].distance_m,
                time_s,
                velocity_ms: v,
                accel_ms2,
            });

            if i < last {
                let ds = samples[i + 1].distance_m - samples[i].distance_m;
                let v_sum = v + velocities[i + 1];

                if ds > MIN_SEGMENT_M {
                    if v_sum <= 0.0 {
                        return Err(ScheduleError::Stalled { index: i });
                    }

                    time_s += 2.0 * ds / v_sum;
                }
            }

            trace!(
                "Schedule sample {}: s = {:.4} m, v = {:.4} m/s, t = {:.4} s",
                i,
                samples[i].distance_m,
                v,
                time_s
            );
        }

        debug!(
            "Generated a {:.3} s schedule over {:.3} m ({} samples)",
            time_s,
            path.length_m(),
            points.len()
        );

        Ok(Trajectory::new(points))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::{Pose, Waypoint};
    use crate::kinodynamics::SwerveKinodynamics;
    use crate::path::{parameterise_splines, SamplerParams};
    use crate::spline::{smooth_chain, spline_chain};
    use crate::timing::{ConstantConstraint, ConstraintPreset, ConstraintSet};

    fn wp(x: f64, y: f64, heading: f64) -> Waypoint {
        Waypoint::new(Pose::new(x, y, heading))
    }

    fn path(wps: &[Waypoint]) -> Path {
        let (chain, _) = smooth_chain(wps).unwrap();
        parameterise_splines(&chain, &SamplerParams::default()).unwrap()
    }

    #[test]
    fn test_rest_to_rest() {
        let kino = SwerveKinodynamics::for_test();
        let generator = ScheduleGenerator::new(ConstraintPreset::ForTest.build(&kino).unwrap());

        let traj = generator
            .generate(&path(&[wp(0.0, 0.0, 0.0), wp(1.0, 0.0, 0.0)]), 0.0, 0.0)
            .unwrap();
        let points = traj.points();

        assert_eq!(points[0].velocity_ms, 0.0);
        assert_eq!(points[0].time_s, 0.0);
        assert_near!(points.last().unwrap().velocity_ms, 0.0, 1e-9);
        assert_eq!(points.last().unwrap().accel_ms2, 0.0);

        // Accelerates then decelerates
        let peak = points.iter().map(|p| p.velocity_ms).fold(0.0, f64::max);
        assert!(peak > 1.0);
        assert!(traj.duration_s() > 0.0 && traj.duration_s() < 2.0);
    }

    #[test]
    fn test_all_presets_bounded() {
        let kino = SwerveKinodynamics::for_test();
        let p = path(&[
            wp(0.0, 0.0, 0.0),
            wp(1.0, 0.5, 0.5),
            wp(2.0, 0.0, 1.0),
            wp(3.0, 1.0, -0.5),
        ]);

        for preset in ConstraintPreset::NAMED.iter() {
            let constraints = preset.build(&kino).unwrap();
            let generator = ScheduleGenerator::new(constraints);
            let traj = generator.generate(&p, 0.0, 0.0).unwrap();
            let points = traj.points();

            assert_eq!(points.len(), p.len());

            for pair in points.windows(2) {
                assert!(pair[1].time_s >= pair[0].time_s);
            }

            for pt in points.iter() {
                let bound = generator.constraints().max_velocity(&pt.pose);
                assert!(pt.velocity_ms >= 0.0);
                assert!(
                    pt.velocity_ms <= bound + 1e-9,
                    "{:?}: {} > {}",
                    preset,
                    pt.velocity_ms,
                    bound
                );
            }
        }
    }

    #[test]
    fn test_accel_within_limits_at_both_ends() {
        let kino = SwerveKinodynamics::for_test();
        let p = path(&[
            wp(0.0, 0.0, 0.0),
            wp(1.0, 0.5, 0.5),
            wp(2.0, 0.0, 1.0),
            wp(3.0, 1.0, -0.5),
        ]);

        for preset in ConstraintPreset::NAMED.iter() {
            let generator = ScheduleGenerator::new(preset.build(&kino).unwrap());
            let traj = generator.generate(&p, 0.0, 0.0).unwrap();
            let points = traj.points();

            for (i, pair) in points.windows(2).enumerate() {
                let (near, far) = (&pair[0], &pair[1]);
                let accel = near.accel_ms2;

                // The stored acceleration holds over the segment to the next sample
                let near_limits = generator
                    .constraints()
                    .accel_limits(&near.pose, near.velocity_ms);
                assert!(
                    accel >= near_limits.min - 1e-6 && accel <= near_limits.max + 1e-6,
                    "{:?} sample {}: {} outside [{}, {}]",
                    preset,
                    i,
                    accel,
                    near_limits.min,
                    near_limits.max
                );

                // Braking is also within what the far end allows
                let far_limits = generator
                    .constraints()
                    .accel_limits(&far.pose, far.velocity_ms);
                if accel < 0.0 {
                    assert!(
                        accel >= far_limits.min - 1e-6,
                        "{:?} sample {}: {} < {}",
                        preset,
                        i,
                        accel,
                        far_limits.min
                    );
                }
            }
        }
    }

    #[test]
    fn test_accel_limited() {
        let kino = SwerveKinodynamics::for_test();
        let generator = ScheduleGenerator::new(
            ConstraintSet::new().with(ConstantConstraint::new(&kino, 0.2, 0.1)),
        );

        let traj = generator
            .generate(&path(&[wp(0.0, 0.0, 0.0), wp(2.0, 0.0, 0.0)]), 0.0, 0.0)
            .unwrap();

        for pt in traj.points() {
            assert!(pt.velocity_ms <= 1.0 + 1e-12);
            assert!(pt.accel_ms2 <= 1.0 + 1e-9);
            assert!(pt.accel_ms2 >= -2.0 - 1e-9);
        }

        // Cruises at the velocity limit in the middle
        let mid = traj.sample(traj.duration_s() / 2.0).unwrap();
        assert_near!(mid.velocity_ms, 1.0, 1e-9);
    }

    #[test]
    fn test_boundary_velocities() {
        let kino = SwerveKinodynamics::for_test();
        let generator = ScheduleGenerator::new(ConstraintPreset::Slow.build(&kino).unwrap());
        let p = path(&[wp(0.0, 0.0, 0.0), wp(1.0, 0.0, 0.0)]);

        // Start velocities above the limit are clamped to it
        let traj = generator.generate(&p, 100.0, 0.5).unwrap();
        assert_near!(traj.points()[0].velocity_ms, 1.25, 1e-9);
        assert_near!(traj.points().last().unwrap().velocity_ms, 0.5, 1e-9);

        assert!(matches!(
            generator.generate(&p, -1.0, 0.0),
            Err(ScheduleError::InvalidBoundaryVelocity { .. })
        ));
        assert!(matches!(
            generator.generate(&p, 0.0, f64::NAN),
            Err(ScheduleError::InvalidBoundaryVelocity { .. })
        ));
    }

    #[test]
    fn test_errors_and_trivial_paths() {
        let kino = SwerveKinodynamics::for_test();
        let p = path(&[wp(0.0, 0.0, 0.0), wp(1.0, 0.0, 0.0)]);

        // No constraints at all
        let generator = ScheduleGenerator::new(ConstraintSet::new());
        assert!(matches!(
            generator.generate(&p, 0.0, 0.0),
            Err(ScheduleError::Unbounded { index: 0 })
        ));

        // No acceleration available, so the vehicle can never leave the start
        let generator = ScheduleGenerator::new(StuckConstraint);
        assert!(matches!(
            generator.generate(&p, 0.0, 0.0),
            Err(ScheduleError::Stalled { index: 0 })
        ));

        let generator = ScheduleGenerator::new(ConstraintPreset::ForTest.build(&kino).unwrap());

        let chain = spline_chain(&[wp(0.0, 0.0, 0.0), wp(0.0, 0.0, 1.0)]).unwrap();
        let rotate_only = parameterise_splines(&chain, &SamplerParams::default()).unwrap();
        let traj = generator.generate(&rotate_only, 0.0, 0.0).unwrap();
        assert_eq!(traj.len(), 1);
        assert_eq!(traj.duration_s(), 0.0);

        let traj = generator.generate(&Path::default(), 0.0, 0.0).unwrap();
        assert!(traj.is_empty());
    }

    #[derive(Debug)]
    struct StuckConstraint;

    impl TimingConstraint for StuckConstraint {
        fn max_velocity(&self, _sample: &crate::geom::PoseWithMotion) -> f64 {
            1.0
        }

        fn accel_limits(
            &self,
            _sample: &crate::geom::PoseWithMotion,
            _velocity_ms: f64,
        ) -> crate::timing::MinMax {
            crate::timing::MinMax::new(0.0, 0.0)
        }
    }
}
