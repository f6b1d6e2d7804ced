//! Chain smoothing
//!
//! A joint is the boundary between two neighbouring segments of a chain, joint `j` sits between
//! segment `j` and segment `j + 1`. Smoothing happens in two steps:
//!
//! 1. [`force_c1`] gives every joint a single first derivative in position and heading.
//! 2. [`optimise`] adjusts the magnitude of every joint tangent to minimise the curvature jump
//!    across the joints, then gives both sides of each joint the same second derivative.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use nalgebra::Vector2;
use serde::Serialize;
use std::f64::consts::TAU;

// Internal
use super::{HolonomicSpline, Knot, SplineError, EPSILON};
use util::maths::{clamp, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of gradient descent iterations in [`optimise`].
pub const MAX_OPTIMISE_ITERS: usize = 100;

/// Curvature mismatch under which the optimisation is considered converged.
///
/// Units: 1/meters
pub const MISMATCH_TOLERANCE_M: f64 = 1e-3;

/// Maximum number of step halvings in one line search.
const MAX_BACKTRACKS: usize = 20;

/// Tolerance on the position and heading gap at a joint.
const JOINT_TOLERANCE: f64 = 1e-6;

/// Relative tolerance used by the continuity checks.
const CONTINUITY_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Outcome of a call to [`optimise`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmoothingReport {
    /// Number of gradient descent iterations performed.
    pub iterations: usize,

    /// Worst curvature mismatch over all joints before optimising.
    ///
    /// Units: 1/meters
    pub initial_max_mismatch_m: f64,

    /// Worst curvature mismatch over all joints after optimising, before the second derivatives
    /// were blended.
    ///
    /// Units: 1/meters
    pub max_mismatch_m: f64,

    /// True if the final mismatch is under [`MISMATCH_TOLERANCE_M`].
    pub converged: bool,
}

/// A joint whose tangent magnitude is free to change.
#[derive(Debug, Clone, Copy)]
struct FreeJoint {
    /// Index of the joint in the chain.
    joint: usize,

    /// Unit direction of the joint tangent.
    dir: Vector2<f64>,
}

/// The optimisation problem over a chain.
struct Problem<'a> {
    chain: &'a [HolonomicSpline],

    joints: Vec<FreeJoint>,

    /// For each joint in the chain, the index of its free variable, if any.
    var_index: Vec<Option<usize>>,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Make the chain C1 at every joint.
///
/// Both sides of a joint get the same tangent. Its direction bisects the two incoming tangent
/// directions and its magnitude is their mean. Joint heading rates are averaged, and the heading
/// of each segment is shifted by whole turns so that heading is continuous along the chain.
/// Joints next to a stationary segment only get the heading treatment.
pub fn force_c1(chain: &mut [HolonomicSpline]) -> Result<(), SplineError> {
    for joint in 0..chain.len().saturating_sub(1) {
        let left_seg = chain[joint];
        let right_seg = chain[joint + 1];

        let mut left = *left_seg.end();
        let mut right = *right_seg.start();
        let mut right_end = *right_seg.end();

        let gap_m = (right.pos_m - left.pos_m).norm();
        if gap_m > JOINT_TOLERANCE {
            return Err(SplineError::Discontinuous { joint, gap_m });
        }

        let gap_rad = wrap_pi(right.heading_rad - left.heading_rad);
        if gap_rad.abs() > JOINT_TOLERANCE {
            return Err(SplineError::HeadingDiscontinuous { joint, gap_rad });
        }

        // Carry the unwrapped heading through the joint
        let shift = TAU * ((left.heading_rad - right.heading_rad) / TAU).round();
        right.heading_rad += shift;
        right_end.heading_rad += shift;

        let dheading = 0.5 * (left.dheading_rad + right.dheading_rad);
        left.dheading_rad = dheading;
        right.dheading_rad = dheading;

        right.pos_m = left.pos_m;

        let mag_l = left.d_m.norm();
        let mag_r = right.d_m.norm();

        if !left_seg.is_stationary()
            && !right_seg.is_stationary()
            && mag_l > EPSILON
            && mag_r > EPSILON
        {
            let bisector = left.d_m / mag_l + right.d_m / mag_r;

            if bisector.norm() < super::ANTI_PARALLEL_TOLERANCE_RAD {
                return Err(SplineError::AntiParallelJoint { joint });
            }

            let shared = bisector.normalize() * 0.5 * (mag_l + mag_r);
            left.d_m = shared;
            right.d_m = shared;
        }

        chain[joint] = HolonomicSpline::from_knots(*left_seg.start(), left);
        chain[joint + 1] = HolonomicSpline::from_knots(right, right_end);
    }

    Ok(())
}

/// Minimise the curvature mismatch at every joint of a C1 chain.
///
/// The free variables are the magnitudes of the joint tangents, their directions are kept. For a
/// given set of magnitudes each segment's joint second derivatives are estimated as those of the
/// cubic hermite with the same end tangents, which gives the curvature on each side of the joint.
/// The sum of squared mismatches is minimised by gradient descent with a finite difference
/// gradient and a backtracking line search.
///
/// Once done the second derivatives of both sides of each joint are set to the mean of the two
/// estimates, so the chain is C2 at every free joint whether or not the optimisation converged.
/// The outer ends of the chain keep their second derivatives.
///
/// The chain should be made C1 with [`force_c1`] first. Joints next to stationary segments are
/// left untouched.
pub fn optimise(chain: &mut [HolonomicSpline]) -> Result<SmoothingReport, SplineError> {
    let problem = Problem::new(chain);

    if problem.joints.is_empty() {
        return Ok(SmoothingReport {
            iterations: 0,
            initial_max_mismatch_m: 0.0,
            max_mismatch_m: 0.0,
            converged: true,
        });
    }

    // Bound the magnitudes relative to the chord lengths
    let chords: Vec<f64> = chain
        .iter()
        .filter(|s| !s.is_stationary())
        .map(|s| (s.end().pos_m - s.start().pos_m).norm())
        .collect();
    let min_mag = 0.1 * chords.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_mag = 3.0 * chords.iter().cloned().fold(0.0, f64::max);

    let mut mags: Vec<f64> = problem
        .joints
        .iter()
        .map(|j| clamp(&chain[j.joint].end().d_m.norm(), &min_mag, &max_mag))
        .collect();

    let initial_max_mismatch_m = problem.max_mismatch(&mags);
    let mut cost = problem.cost(&mags);
    let mut iterations = 0;

    while iterations < MAX_OPTIMISE_ITERS && problem.max_mismatch(&mags) >= MISMATCH_TOLERANCE_M {
        iterations += 1;

        let grad = problem.gradient(&mags);
        let grad_max = grad.iter().fold(0.0, |acc: f64, g| acc.max(g.abs()));

        if grad_max < 1e-12 {
            break;
        }

        let mut step = 0.25 * mags.iter().cloned().fold(f64::INFINITY, f64::min) / grad_max;
        let mut improved = None;

        for _ in 0..MAX_BACKTRACKS {
            let candidate: Vec<f64> = mags
                .iter()
                .zip(grad.iter())
                .map(|(m, g)| clamp(&(m - step * g), &min_mag, &max_mag))
                .collect();

            let candidate_cost = problem.cost(&candidate);
            if candidate_cost < cost {
                improved = Some((candidate, candidate_cost));
                break;
            }

            step *= 0.5;
        }

        match improved {
            Some((candidate, candidate_cost)) => {
                trace!(
                    "Smoothing iteration {}: cost {:.6e} -> {:.6e}",
                    iterations,
                    cost,
                    candidate_cost
                );
                mags = candidate;
                cost = candidate_cost;
            }
            None => break,
        }
    }

    let max_mismatch_m = problem.max_mismatch(&mags);
    let converged = max_mismatch_m < MISMATCH_TOLERANCE_M;

    let smoothed = problem.blend(&mags);
    chain.copy_from_slice(&smoothed);

    let report = SmoothingReport {
        iterations,
        initial_max_mismatch_m,
        max_mismatch_m,
        converged,
    };

    if converged {
        debug!("Chain smoothed: {:?}", report);
    } else {
        warn!("Chain smoothing did not converge: {:?}", report);
    }

    Ok(report)
}

/// True if position, tangent, heading and heading rate are continuous at every joint.
///
/// Tangents are not compared at joints next to a stationary segment.
pub fn verify_c1(chain: &[HolonomicSpline]) -> bool {
    chain.windows(2).all(|pair| {
        let (l, r) = (&pair[0], &pair[1]);
        let moving = !l.is_stationary() && !r.is_stationary();

        near_vec(&l.point(1.0), &r.point(0.0))
            && (!moving || near_vec(&l.velocity(1.0), &r.velocity(0.0)))
            && wrap_pi(l.heading_unwrapped(1.0) - r.heading_unwrapped(0.0)).abs()
                <= CONTINUITY_TOLERANCE
            && near(l.heading_rate(1.0), r.heading_rate(0.0))
    })
}

/// True if the chain is C1 and the second derivatives and curvature are continuous at every
/// joint between moving segments.
pub fn verify_c2(chain: &[HolonomicSpline]) -> bool {
    verify_c1(chain)
        && chain.windows(2).all(|pair| {
            let (l, r) = (&pair[0], &pair[1]);

            if l.is_stationary() || r.is_stationary() {
                return true;
            }

            near_vec(&l.acceleration(1.0), &r.acceleration(0.0))
                && near(l.heading_accel(1.0), r.heading_accel(0.0))
                && near(l.curvature(1.0), r.curvature(0.0))
        })
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn near(a: f64, b: f64) -> bool {
    (a - b).abs() <= CONTINUITY_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn near_vec(a: &Vector2<f64>, b: &Vector2<f64>) -> bool {
    (a - b).norm() <= CONTINUITY_TOLERANCE * a.norm().max(b.norm()).max(1.0)
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a[0] * b[1] - a[1] * b[0]
}

/// Second derivatives at both ends of the cubic hermite between `p0` and `p1` with tangents `d0`
/// and `d1`.
fn cubic_second_derivs(
    p0: &Vector2<f64>,
    p1: &Vector2<f64>,
    d0: &Vector2<f64>,
    d1: &Vector2<f64>,
) -> (Vector2<f64>, Vector2<f64>) {
    let chord = p1 - p0;
    (
        chord * 6.0 - d0 * 4.0 - d1 * 2.0,
        chord * -6.0 + d0 * 2.0 + d1 * 4.0,
    )
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> Problem<'a> {
    fn new(chain: &'a [HolonomicSpline]) -> Self {
        let num_joints = chain.len().saturating_sub(1);
        let mut joints = Vec::new();
        let mut var_index = vec![None; num_joints];

        for joint in 0..num_joints {
            let d = chain[joint].end().d_m;

            if chain[joint].is_stationary()
                || chain[joint + 1].is_stationary()
                || d.norm() < EPSILON
            {
                continue;
            }

            var_index[joint] = Some(joints.len());
            joints.push(FreeJoint {
                joint,
                dir: d.normalize(),
            });
        }

        Self {
            chain,
            joints,
            var_index,
        }
    }

    /// Start and end tangents of a segment for the given magnitudes.
    fn tangents(&self, seg: usize, mags: &[f64]) -> (Vector2<f64>, Vector2<f64>) {
        let start = match seg.checked_sub(1).and_then(|j| self.var_index[j]) {
            Some(v) => self.joints[v].dir * mags[v],
            None => self.chain[seg].start().d_m,
        };
        let end = match self.var_index.get(seg).copied().flatten() {
            Some(v) => self.joints[v].dir * mags[v],
            None => self.chain[seg].end().d_m,
        };

        (start, end)
    }

    /// Cubic second derivative estimates either side of a free joint.
    fn joint_second_derivs(&self, var: usize, mags: &[f64]) -> (Vector2<f64>, Vector2<f64>) {
        let joint = self.joints[var].joint;
        let left = &self.chain[joint];
        let right = &self.chain[joint + 1];

        let (l0, l1) = self.tangents(joint, mags);
        let (r0, r1) = self.tangents(joint + 1, mags);

        let (_, dd_left) = cubic_second_derivs(&left.start().pos_m, &left.end().pos_m, &l0, &l1);
        let (dd_right, _) =
            cubic_second_derivs(&right.start().pos_m, &right.end().pos_m, &r0, &r1);

        (dd_left, dd_right)
    }

    fn mismatches(&self, mags: &[f64]) -> Vec<f64> {
        (0..self.joints.len())
            .map(|v| {
                let d = self.joints[v].dir * mags[v];
                let (dd_left, dd_right) = self.joint_second_derivs(v, mags);

                (cross(&d, &dd_left) - cross(&d, &dd_right)) / d.norm().powi(3)
            })
            .collect()
    }

    fn cost(&self, mags: &[f64]) -> f64 {
        self.mismatches(mags).iter().map(|m| m * m).sum()
    }

    fn max_mismatch(&self, mags: &[f64]) -> f64 {
        self.mismatches(mags)
            .iter()
            .fold(0.0, |acc: f64, m| acc.max(m.abs()))
    }

    /// Central difference gradient of the cost.
    fn gradient(&self, mags: &[f64]) -> Vec<f64> {
        let mut perturbed = mags.to_vec();

        (0..mags.len())
            .map(|v| {
                let h = 1e-6 * mags[v].max(1.0);

                perturbed[v] = mags[v] + h;
                let up = self.cost(&perturbed);
                perturbed[v] = mags[v] - h;
                let down = self.cost(&perturbed);
                perturbed[v] = mags[v];

                (up - down) / (2.0 * h)
            })
            .collect()
    }

    /// Rebuild the chain with the given magnitudes and blended joint second derivatives.
    fn blend(&self, mags: &[f64]) -> Vec<HolonomicSpline> {
        let mut starts: Vec<Knot> = self.chain.iter().map(|s| *s.start()).collect();
        let mut ends: Vec<Knot> = self.chain.iter().map(|s| *s.end()).collect();

        for (v, free) in self.joints.iter().enumerate() {
            let j = free.joint;
            let d = free.dir * mags[v];
            let (dd_left, dd_right) = self.joint_second_derivs(v, mags);
            let dd = (dd_left + dd_right) * 0.5;
            let ddheading = 0.5 * (ends[j].ddheading_rad + starts[j + 1].ddheading_rad);

            ends[j].d_m = d;
            ends[j].dd_m = dd;
            ends[j].ddheading_rad = ddheading;
            starts[j + 1].d_m = d;
            starts[j + 1].dd_m = dd;
            starts[j + 1].ddheading_rad = ddheading;
        }

        starts
            .into_iter()
            .zip(ends.into_iter())
            .map(|(s, e)| HolonomicSpline::from_knots(s, e))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::{Pose, Waypoint};
    use crate::spline::spline_chain;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn wp(x: f64, y: f64, heading: f64) -> Waypoint {
        Waypoint::new(Pose::new(x, y, heading))
    }

    fn segment(x0: f64, y0: f64, c0: f64, x1: f64, y1: f64, c1: f64) -> HolonomicSpline {
        HolonomicSpline::from_waypoints(
            &Waypoint::with_course(Pose::new(x0, y0, 0.0), c0),
            &Waypoint::with_course(Pose::new(x1, y1, 0.0), c1),
        )
        .unwrap()
    }

    #[test]
    fn test_force_c1_corner() {
        // Each segment built on its own has a corner at the joint
        let mut chain = vec![
            segment(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            segment(1.0, 0.0, FRAC_PI_2, 1.0, 2.0, FRAC_PI_2),
        ];
        assert!(!verify_c1(&chain));

        force_c1(&mut chain).unwrap();
        assert!(verify_c1(&chain));

        // The shared tangent bisects the corner with the mean magnitude
        let d = chain[0].velocity(1.0);
        assert_near!(d[1].atan2(d[0]), PI / 4.0, 1e-12);
        assert_near!(d.norm(), 0.5 * (1.2 + 2.4), 1e-12);

        // The outer ends are untouched
        assert_near!(chain[0].velocity(0.0)[0], 1.2, 1e-12);
        assert_near!(chain[1].velocity(1.0)[1], 2.4, 1e-12);
    }

    #[test]
    fn test_force_c1_heading_through_wrap() {
        let wps = [
            wp(0.0, 0.0, PI - 0.2),
            wp(1.0, 0.0, PI - 0.1),
            wp(2.0, 0.0, -PI + 0.1),
        ];
        let mut chain = spline_chain(&wps).unwrap();
        force_c1(&mut chain).unwrap();

        assert!(verify_c1(&chain));
        assert_near!(chain[1].heading_unwrapped(1.0), PI + 0.1, 1e-12);
        assert_near!(chain[0].heading_rate(1.0), 0.15, 1e-12);
    }

    #[test]
    fn test_force_c1_errors() {
        let mut chain = vec![
            segment(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            segment(1.5, 0.0, 0.0, 2.0, 0.0, 0.0),
        ];
        assert!(matches!(
            force_c1(&mut chain),
            Err(SplineError::Discontinuous { joint: 0, .. })
        ));

        let mut chain = vec![
            segment(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            segment(1.0, 0.0, PI, 0.0, 0.0, PI),
        ];
        assert!(matches!(
            force_c1(&mut chain),
            Err(SplineError::AntiParallelJoint { joint: 0 })
        ));
    }

    #[test]
    fn test_optimise_makes_c2() {
        let wps = [
            wp(0.0, 0.0, 0.0),
            wp(1.0, 0.0, 0.0),
            wp(2.0, 0.5, 0.0),
            wp(4.0, 0.5, 0.0),
        ];
        let mut chain = spline_chain(&wps).unwrap();
        force_c1(&mut chain).unwrap();

        let report = optimise(&mut chain).unwrap();

        assert!(report.iterations > 0 && report.iterations <= MAX_OPTIMISE_ITERS);
        assert!(report.max_mismatch_m < report.initial_max_mismatch_m);
        assert_eq!(report.converged, report.max_mismatch_m < MISMATCH_TOLERANCE_M);
        assert!(verify_c1(&chain));
        assert!(verify_c2(&chain));

        // Waypoints are still hit
        assert_near!(chain[1].point(0.0)[0], 1.0, 1e-12);
        assert_near!(chain[2].point(0.0)[1], 0.5, 1e-12);
        assert_near!(chain[2].point(1.0)[0], 4.0, 1e-12);
    }

    #[test]
    fn test_optimise_already_matched() {
        // A symmetric chain already has matching curvature at its only joint
        let wps = [wp(0.0, 0.0, 0.0), wp(1.0, 0.0, 0.0), wp(2.0, 1.0, 0.0)];
        let mut chain = spline_chain(&wps).unwrap();
        force_c1(&mut chain).unwrap();

        let report = optimise(&mut chain).unwrap();
        assert_eq!(report.iterations, 0);
        assert!(report.converged);
        assert!(verify_c2(&chain));
    }

    #[test]
    fn test_optimise_reports_no_convergence() {
        // Leaves upwards and arrives upwards through a joint heading along x. With one free joint
        // the mismatch only falls with the square of the tangent magnitude, which is bounded, so
        // it cannot reach the tolerance.
        let wps = [
            Waypoint::with_course(Pose::new(0.0, 0.0, 0.0), FRAC_PI_2),
            Waypoint::with_course(Pose::new(1.0, 0.0, 0.0), 0.0),
            Waypoint::with_course(Pose::new(2.0, 0.0, 0.0), FRAC_PI_2),
        ];
        let mut chain = spline_chain(&wps).unwrap();
        force_c1(&mut chain).unwrap();

        let report = optimise(&mut chain).unwrap();

        assert!(!report.converged);
        assert!(report.iterations >= 1 && report.iterations <= MAX_OPTIMISE_ITERS);
        assert!(report.max_mismatch_m >= MISMATCH_TOLERANCE_M);
        assert!(report.max_mismatch_m < report.initial_max_mismatch_m);

        // The second derivatives are blended either way
        assert!(verify_c2(&chain));
    }

    #[test]
    fn test_optimise_trivial_chains() {
        let mut single = spline_chain(&[wp(0.0, 0.0, 0.0), wp(1.0, 0.0, 0.0)]).unwrap();
        let report = optimise(&mut single).unwrap();
        assert!(report.converged);
        assert_eq!(report.iterations, 0);

        // Stationary segments are skipped
        let wps = [wp(0.0, 0.0, 0.0), wp(1.0, 0.0, 0.0), wp(1.0, 0.0, 1.0)];
        let mut chain = spline_chain(&wps).unwrap();
        force_c1(&mut chain).unwrap();
        let report = optimise(&mut chain).unwrap();
        assert!(report.converged);
        assert!(verify_c1(&chain));
    }
}
