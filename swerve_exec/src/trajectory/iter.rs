//! Trajectory cursor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;

// Internal
use super::Trajectory;
use crate::timing::TimedPose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A cursor over a shared trajectory.
///
/// The cursor only moves forwards, and is done once it reaches the end of the trajectory.
#[derive(Debug, Clone)]
pub struct TrajectoryIter {
    trajectory: Arc<Trajectory>,

    /// Time from the start of the trajectory.
    time_s: f64,

    done: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajectoryIter {
    pub fn new(trajectory: Arc<Trajectory>) -> Self {
        let done = trajectory.duration_s() <= 0.0;

        Self {
            trajectory,
            time_s: 0.0,
            done,
        }
    }

    pub fn trajectory(&self) -> &Arc<Trajectory> {
        &self.trajectory
    }

    /// Time of the cursor from the start of the trajectory.
    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Move the cursor forward by `dt_s`, clamped to the end of the trajectory, and return the
    /// state at the new time. Once done further calls do not move the cursor.
    pub fn advance(&mut self, dt_s: f64) -> Option<TimedPose> {
        if !self.done && dt_s > 0.0 {
            let duration_s = self.trajectory.duration_s();

            self.time_s = (self.time_s + dt_s).min(duration_s);

            if self.time_s >= duration_s {
                self.done = true;
            }
        }

        self.current()
    }

    /// The state at the cursor.
    pub fn current(&self) -> Option<TimedPose> {
        self.trajectory.sample(self.time_s)
    }

    /// The state `dt_s` ahead of the cursor, without moving it.
    pub fn preview(&self, dt_s: f64) -> Option<TimedPose> {
        self.trajectory.sample(self.time_s + dt_s.max(0.0))
    }

    /// Move the cursor back to the start of the trajectory.
    pub fn restart(&mut self) {
        self.time_s = 0.0;
        self.done = self.trajectory.duration_s() <= 0.0;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::PoseWithMotion;

    fn traj() -> Arc<Trajectory> {
        let points = (0..=4)
            .map(|i| TimedPose {
                pose: PoseWithMotion::default(),
                distance_m: i as f64,
                time_s: i as f64 * 0.5,
                velocity_ms: 1.0,
                accel_ms2: 0.0,
            })
            .collect();

        Arc::new(Trajectory::new(points))
    }

    #[test]
    fn test_advance_clamps() {
        let mut it = TrajectoryIter::new(traj());

        assert!(!it.is_done());
        assert_eq!(it.current().unwrap().time_s, 0.0);

        let s = it.advance(0.75).unwrap();
        assert_near!(s.distance_m, 1.5, 1e-12);
        assert!(!it.is_done());

        let s = it.advance(10.0).unwrap();
        assert_eq!(it.time_s(), 2.0);
        assert_eq!(s.distance_m, 4.0);
        assert!(it.is_done());

        // Further advances do nothing
        it.advance(1.0);
        assert_eq!(it.time_s(), 2.0);
        assert!(it.is_done());
    }

    #[test]
    fn test_preview_does_not_move() {
        let mut it = TrajectoryIter::new(traj());
        it.advance(0.5);

        let ahead = it.preview(0.25).unwrap();
        assert_near!(ahead.distance_m, 1.5, 1e-12);
        assert_eq!(it.time_s(), 0.5);
        assert_eq!(it.preview(100.0).unwrap().distance_m, 4.0);

        // Backwards steps are ignored
        it.advance(-1.0);
        assert_eq!(it.time_s(), 0.5);
        assert_eq!(it.preview(-1.0), it.current());
    }

    #[test]
    fn test_restart() {
        let mut it = TrajectoryIter::new(traj());
        it.advance(5.0);
        assert!(it.is_done());

        it.restart();
        assert!(!it.is_done());
        assert_eq!(it.time_s(), 0.0);
    }

    #[test]
    fn test_empty_is_done() {
        let mut it = TrajectoryIter::new(Arc::new(Trajectory::default()));

        assert!(it.is_done());
        assert_eq!(it.advance(1.0), None);
        assert_eq!(it.current(), None);
    }
}
