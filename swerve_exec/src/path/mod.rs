//! # Path module
//!
//! A path is the geometry of a motion with no timing information: an ordered list of poses, each
//! with the direction of motion through it and the distance travelled to reach it. Paths are built
//! by sampling spline chains, see [`parameterise_splines`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sampler;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use crate::geom::PoseWithMotion;
pub use sampler::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single point on a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathSample {
    pub pose: PoseWithMotion,

    /// Arc length from the start of the path.
    ///
    /// Units: meters
    pub distance_m: f64,
}

/// An immutable sequence of samples with strictly increasing distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    samples: Vec<PathSample>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur while building a path.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Sampling tolerance {0} must be positive and finite but was {1}")]
    InvalidTolerance(&'static str, f64),

    #[error("Path samples must have strictly increasing distance, sample {0} does not")]
    NonIncreasingDistance(usize),

    #[error("Path sample {0} is not finite")]
    NonFinite(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Path {
    /// Build a path from a list of samples, checking they are finite and strictly increasing in
    /// distance.
    pub fn new(samples: Vec<PathSample>) -> Result<Self, PathError> {
        for (i, s) in samples.iter().enumerate() {
            if !s.pose.is_finite() || !s.distance_m.is_finite() {
                return Err(PathError::NonFinite(i));
            }

            if i > 0 && s.distance_m <= samples[i - 1].distance_m {
                return Err(PathError::NonIncreasingDistance(i));
            }
        }

        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[PathSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&PathSample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&PathSample> {
        self.samples.last()
    }

    /// Total arc length of the path.
    pub fn length_m(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(f), Some(l)) => l.distance_m - f.distance_m,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::{MotionDirection, Pose};

    fn sample(x: f64, distance_m: f64) -> PathSample {
        PathSample {
            pose: PoseWithMotion::new(
                Pose::new(x, 0.0, 0.0),
                MotionDirection::new(1.0, 0.0, 0.0, 0.0),
                0.0,
            ),
            distance_m,
        }
    }

    #[test]
    fn test_new_path() {
        let path = Path::new(vec![sample(0.0, 0.0), sample(0.5, 0.5), sample(1.0, 1.0)]).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.length_m(), 1.0);

        assert!(matches!(
            Path::new(vec![sample(0.0, 0.0), sample(0.0, 0.0)]),
            Err(PathError::NonIncreasingDistance(1))
        ));
        assert!(matches!(
            Path::new(vec![sample(f64::NAN, 0.0)]),
            Err(PathError::NonFinite(0))
        ));

        assert_eq!(Path::default().length_m(), 0.0);
    }
}
