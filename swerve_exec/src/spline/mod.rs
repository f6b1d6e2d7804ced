//! # Spline module
//!
//! Builds chains of holonomic splines through a list of waypoints. Each segment is a quintic in
//! position and an independent quintic in heading, see [`HolonomicSpline`]. A freshly built chain
//! is only C0 in general; the [`smoothing`] functions make it C1 and then minimise the curvature
//! jumps at the joints.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod holonomic;
pub mod smoothing;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use holonomic::*;
pub use smoothing::{force_c1, optimise, verify_c1, verify_c2, SmoothingReport};
use crate::geom::Waypoint;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur while building or smoothing splines.
#[derive(Debug, thiserror::Error)]
pub enum SplineError {
    #[error("Spline inputs must be finite")]
    NonFinite,

    #[error(
        "Endpoint courses {course0} and {course1} rad are anti-parallel, the curvature would be \
         unbounded"
    )]
    AntiParallel { course0: f64, course1: f64 },

    #[error("The segments either side of joint {joint} point in opposite directions")]
    AntiParallelJoint { joint: usize },

    #[error("There is a {gap_m} m gap between the segments at joint {joint}")]
    Discontinuous { joint: usize, gap_m: f64 },

    #[error("There is a {gap_rad} rad heading jump between the segments at joint {joint}")]
    HeadingDiscontinuous { joint: usize, gap_rad: f64 },

    #[error("At least two waypoints are needed to build a spline, got {0}")]
    TooFewWaypoints(usize),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build one segment between each neighbouring pair of waypoints.
///
/// Waypoints without a course get one from their neighbours: the ends point along the first and
/// last chords, interior waypoints point from the previous waypoint to the next one. The chain is
/// not smoothed.
pub fn spline_chain(waypoints: &[Waypoint]) -> Result<Vec<HolonomicSpline>, SplineError> {
    if waypoints.len() < 2 {
        return Err(SplineError::TooFewWaypoints(waypoints.len()));
    }

    let last = waypoints.len() - 1;

    let with_courses: Vec<Waypoint> = waypoints
        .iter()
        .enumerate()
        .map(|(i, wp)| {
            if wp.course_rad.is_some() {
                return *wp;
            }

            let prev = &waypoints[i.saturating_sub(1)].pose;
            let next = &waypoints[(i + 1).min(last)].pose;

            let course_rad = prev
                .bearing_to(next)
                .or_else(|| wp.pose.bearing_to(next))
                .or_else(|| prev.bearing_to(&wp.pose));

            Waypoint {
                pose: wp.pose,
                course_rad,
            }
        })
        .collect();

    with_courses
        .windows(2)
        .map(|pair| HolonomicSpline::from_waypoints(&pair[0], &pair[1]))
        .collect()
}

/// Build a chain through the waypoints, make it C1 and minimise the curvature mismatch at the
/// joints.
pub fn smooth_chain(
    waypoints: &[Waypoint],
) -> Result<(Vec<HolonomicSpline>, SmoothingReport), SplineError> {
    let mut chain = spline_chain(waypoints)?;

    force_c1(&mut chain)?;
    let report = optimise(&mut chain)?;

    Ok((chain, report))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Pose;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_chain_courses() {
        let wps = [
            Waypoint::new(Pose::new(0.0, 0.0, 0.0)),
            Waypoint::new(Pose::new(1.0, 0.0, 0.0)),
            Waypoint::new(Pose::new(2.0, 1.0, 0.0)),
        ];

        let chain = spline_chain(&wps).unwrap();
        assert_eq!(chain.len(), 2);

        // Ends point along their chords
        let d = chain[0].velocity(0.0);
        assert_near!(d[1].atan2(d[0]), 0.0, 1e-12);
        let d = chain[1].velocity(1.0);
        assert_near!(d[1].atan2(d[0]), FRAC_PI_4, 1e-12);

        // The interior waypoint points from the first to the last waypoint, on both sides
        let d = chain[0].velocity(1.0);
        assert_near!(d[1].atan2(d[0]), 0.5f64.atan(), 1e-12);
        let d = chain[1].velocity(0.0);
        assert_near!(d[1].atan2(d[0]), 0.5f64.atan(), 1e-12);
    }

    #[test]
    fn test_chain_too_short() {
        assert!(matches!(
            spline_chain(&[Waypoint::new(Pose::new(0.0, 0.0, 0.0))]),
            Err(SplineError::TooFewWaypoints(1))
        ));
    }

    #[test]
    fn test_smooth_chain() {
        let wps = [
            Waypoint::new(Pose::new(0.0, 0.0, 0.0)),
            Waypoint::new(Pose::new(1.0, 0.5, 0.5)),
            Waypoint::new(Pose::new(2.0, 0.0, 1.0)),
            Waypoint::new(Pose::new(3.0, 1.0, 1.5)),
        ];

        let (chain, report) = smooth_chain(&wps).unwrap();

        assert!(verify_c1(&chain));
        assert!(verify_c2(&chain));
        assert!(report.max_mismatch_m <= report.initial_max_mismatch_m);
    }
}
