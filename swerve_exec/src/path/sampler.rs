//! Spline sampling
//!
//! Walks along each spline in a chain, recursively splitting each parameter step until the
//! position, heading and curvature changes across it are all within tolerance.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::Deserialize;

// Internal
use super::{Path, PathError, PathSample};
use crate::geom::PoseWithMotion;
use crate::spline::HolonomicSpline;
use util::maths::get_ang_dist;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of equal parameter steps each spline is split into before any bisection.
const INITIAL_STEPS: usize = 4;

/// Distance under which two samples are treated as the same point.
///
/// Units: meters
const MIN_STEP_M: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tolerances used when sampling splines.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SamplerParams {
    /// Maximum distance between neighbouring samples.
    ///
    /// Units: meters
    pub max_dx_m: f64,

    /// Maximum heading change between neighbouring samples.
    ///
    /// Units: radians
    pub max_dtheta_rad: f64,

    /// Maximum curvature change between neighbouring samples.
    ///
    /// Units: 1/meters
    pub max_dcurvature_m: f64,

    /// Maximum number of times a parameter step is bisected.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SamplerParams {
    /// Check every tolerance is positive and finite.
    pub fn validate(&self) -> Result<(), PathError> {
        let checks = [
            ("max_dx_m", self.max_dx_m),
            ("max_dtheta_rad", self.max_dtheta_rad),
            ("max_dcurvature_m", self.max_dcurvature_m),
        ];

        for &(name, value) in checks.iter() {
            if !value.is_finite() || value <= 0.0 {
                return Err(PathError::InvalidTolerance(name, value));
            }
        }

        Ok(())
    }
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            max_dx_m: 0.0127,
            max_dtheta_rad: 0.1,
            max_dcurvature_m: 1.0,
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_depth() -> usize {
    16
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Sample a chain of splines into a path.
///
/// Stationary splines are skipped, and samples which do not advance along the path are dropped,
/// so every sample of the result has a well defined direction of motion. If no spline moves the
/// path holds only the start pose of the chain, and an empty chain gives an empty path.
pub fn parameterise_splines(
    splines: &[HolonomicSpline],
    params: &SamplerParams,
) -> Result<Path, PathError> {
    params.validate()?;

    let mut samples: Vec<PathSample> = Vec::new();

    for spline in splines.iter().filter(|s| !s.is_stationary()) {
        if samples.is_empty() {
            samples.push(PathSample {
                pose: spline.pose_with_motion(0.0),
                distance_m: 0.0,
            });
        }

        let mut poses = Vec::new();
        for step in 0..INITIAL_STEPS {
            let t0 = step as f64 / INITIAL_STEPS as f64;
            let t1 = (step + 1) as f64 / INITIAL_STEPS as f64;
            sample_step(spline, t0, t1, params, 0, &mut poses);
        }

        for pose in poses {
            // Samples are always pushed before this point, the first one above
            let (prev_pos, prev_dist) = match samples.last() {
                Some(prev) => (prev.pose.pose.position_m, prev.distance_m),
                None => continue,
            };

            let ds = (pose.pose.position_m - prev_pos).norm();
            if ds < MIN_STEP_M {
                continue;
            }

            samples.push(PathSample {
                pose,
                distance_m: prev_dist + ds,
            });
        }
    }

    if samples.is_empty() {
        if let Some(first) = splines.first() {
            samples.push(PathSample {
                pose: first.pose_with_motion(0.0),
                distance_m: 0.0,
            });
        }
    }

    let path = Path::new(samples)?;

    debug!(
        "Sampled {} splines into a {:.3} m path of {} samples",
        splines.len(),
        path.length_m(),
        path.len()
    );

    Ok(path)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Push the samples for the parameter step `t0` to `t1`, excluding `t0` itself.
fn sample_step(
    spline: &HolonomicSpline,
    t0: f64,
    t1: f64,
    params: &SamplerParams,
    depth: usize,
    out: &mut Vec<PoseWithMotion>,
) {
    let start = spline.pose_with_motion(t0);
    let end = spline.pose_with_motion(t1);

    let dx = start.pose.distance_to(&end.pose);
    let dtheta = get_ang_dist(start.pose.heading_rad, end.pose.heading_rad).abs();
    let dcurvature = (end.curvature_m() - start.curvature_m()).abs();

    let within_tolerance = dx <= params.max_dx_m
        && dtheta <= params.max_dtheta_rad
        && dcurvature <= params.max_dcurvature_m;

    if within_tolerance || depth >= params.max_depth {
        out.push(end);
    } else {
        let mid = 0.5 * (t0 + t1);
        sample_step(spline, t0, mid, params, depth + 1, out);
        sample_step(spline, mid, t1, params, depth + 1, out);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
