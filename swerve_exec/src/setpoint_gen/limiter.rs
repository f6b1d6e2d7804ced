//! Drive acceleration limiter
//!
//! Limits both acceleration, assuming the drive motors are current limited, and speed, using a
//! back EMF model, so no separate speed limit is needed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use crate::kinodynamics::{SwerveKinodynamics, WheelVector, NUM_WHEELS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of root search iterations per wheel.
pub const MAX_LIMITER_ITERS: usize = 10;

/// Wheel speed error at which the root search is considered converged.
///
/// Units: meters/second
const SPEED_TOLERANCE_MS: f64 = 1e-4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Enforces the drive motor torque limits on a change of wheel velocities.
#[derive(Debug, Clone, Copy)]
pub struct DriveAccelerationLimiter {
    kino: SwerveKinodynamics,
}

/// The result of limiting one change of wheel velocities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitResult {
    /// Fraction of the desired change that can be achieved this cycle, in [0, 1].
    pub s: f64,

    /// False if the root search for any wheel ran out of iterations, in which case `s` is the
    /// last fraction known to be achievable.
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LimitResult {
    fn default() -> Self {
        Self {
            s: 1.0,
            converged: true,
        }
    }
}

impl DriveAccelerationLimiter {
    pub fn new(kino: SwerveKinodynamics) -> Self {
        Self { kino }
    }

    /// Find the largest fraction `s` of the change from `prev` to `desired` which every wheel can
    /// achieve within `dt_s`.
    ///
    /// Each wheel may be limited by earlier wheels, so its search is restricted to the part of
    /// its change that they allow.
    pub fn enforce_wheel_accel_limit(
        &self,
        prev: &[WheelVector; NUM_WHEELS],
        desired: &[WheelVector; NUM_WHEELS],
        dt_s: f64,
    ) -> LimitResult {
        let mut result = LimitResult::default();

        for i in 0..NUM_WHEELS {
            let max_vel_step = self.max_vel_step(&prev[i], &desired[i], dt_s);

            let reachable = prev[i] + (desired[i] - prev[i]) * result.s;
            let (wheel_s, converged) = find_drive_max_s(&prev[i], &reachable, max_vel_step);

            trace!(
                "Wheel {}: max step {:.4} m/s, s = {:.4} of {:.4}",
                i,
                max_vel_step,
                wheel_s,
                result.s
            );

            result.s *= wheel_s;
            result.converged &= converged;

            if result.s <= 0.0 {
                result.s = 0.0;
                break;
            }
        }

        result
    }

    /// Largest change in speed a wheel can make in `dt_s` when going from `prev` to `desired`.
    ///
    /// Units: meters/second
    pub fn max_vel_step(&self, prev: &WheelVector, desired: &WheelVector, dt_s: f64) -> f64 {
        let prev_speed = prev.norm();

        let accel = if desired.norm() > prev_speed {
            self.kino.available_accel_ms2(prev_speed)
        } else {
            self.kino.params.max_drive_decel_ms2
        };

        dt_s * accel
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the fraction of the way from `prev` to `desired` at which the wheel speed has changed by
/// `max_vel_step`, using regula falsi (Illinois variant) on the bracket [0, 1].
///
/// Returns the fraction and whether the search converged.
fn find_drive_max_s(prev: &WheelVector, desired: &WheelVector, max_vel_step: f64) -> (f64, bool) {
    if max_vel_step <= 0.0 {
        return (0.0, true);
    }

    let f_0 = prev.norm();
    let f_1 = desired.norm();
    let diff = f_1 - f_0;

    if diff.abs() <= max_vel_step {
        return (1.0, true);
    }

    // The wheel speed is convex in s so there is a single crossing of the offset in the bracket
    let offset = f_0 + diff.signum() * max_vel_step;
    let func = |s: f64| (prev + (desired - prev) * s).norm() - offset;

    let (mut lo, mut g_lo) = (0.0, f_0 - offset);
    let (mut hi, mut g_hi) = (1.0, f_1 - offset);

    // Which end of the bracket moved last, the other end's value is halved if it is kept twice
    let mut last_moved: Option<bool> = None;

    for _ in 0..MAX_LIMITER_ITERS {
        if (g_hi - g_lo).abs() <= f64::EPSILON {
            break;
        }

        let s = (lo - g_lo * (hi - lo) / (g_hi - g_lo)).max(lo).min(hi);
        let g = func(s);

        if g.abs() <= SPEED_TOLERANCE_MS {
            return (s, true);
        }

        if g.signum() == g_lo.signum() {
            lo = s;
            g_lo = g;
            if last_moved == Some(false) {
                g_hi *= 0.5;
            }
            last_moved = Some(false);
        } else {
            hi = s;
            g_hi = g;
            if last_moved == Some(true) {
                g_lo *= 0.5;
            }
            last_moved = Some(true);
        }
    }

    // lo is always on the achievable side of the crossing
    (lo, false)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const DT_S: f64 = 0.02;

    fn all(x: f64, y: f64) -> [WheelVector; NUM_WHEELS] {
        [WheelVector::new(x, y); NUM_WHEELS]
    }

    fn limiter() -> DriveAccelerationLimiter {
        DriveAccelerationLimiter::new(SwerveKinodynamics::for_test())
    }

    #[test]
    fn test_step_fits() {
        let r = limiter().enforce_wheel_accel_limit(&all(0.0, 0.0), &all(0.05, 0.05), DT_S);

        assert_eq!(r.s, 1.0);
        assert!(r.converged);

        // No change at all
        let r = limiter().enforce_wheel_accel_limit(&all(1.0, 0.0), &all(1.0, 0.0), DT_S);
        assert_eq!(r.s, 1.0);
    }

    #[test]
    fn test_accel_limited() {
        // 0.02 s at 10 m/s^2 allows a 0.2 m/s step
        let r = limiter().enforce_wheel_accel_limit(&all(0.0, 0.0), &all(1.0, 0.0), DT_S);

        assert_near!(r.s, 0.2, 1e-9);
        assert!(r.converged);
    }

    #[test]
    fn test_decel_limited() {
        // 0.02 s at 20 m/s^2 allows a 0.4 m/s step
        let r = limiter().enforce_wheel_accel_limit(&all(2.0, 0.0), &all(0.0, 0.0), DT_S);

        assert_near!(r.s, 0.2, 1e-9);
    }

    #[test]
    fn test_back_emf() {
        let l = limiter();

        // At 3 m/s the stall torque only gives 20 * (1 - 3/5) = 8 m/s^2
        let step = l.max_vel_step(
            &WheelVector::new(3.0, 0.0),
            &WheelVector::new(4.0, 0.0),
            DT_S,
        );
        assert_near!(step, 0.16, 1e-12);

        // At full speed there is nothing left to accelerate with
        let r = l.enforce_wheel_accel_limit(&all(5.0, 0.0), &all(6.0, 0.0), DT_S);
        assert_eq!(r.s, 0.0);
    }

    #[test]
    fn test_zero_step() {
        let r = limiter().enforce_wheel_accel_limit(&all(0.0, 0.0), &all(1.0, 0.0), 0.0);
        assert_eq!(r.s, 0.0);
    }

    #[test]
    fn test_one_wheel_without_step() {
        // Only the last wheel is at full speed, it cannot speed up at all
        let prev = [
            WheelVector::new(0.0, 0.0),
            WheelVector::new(1.0, 0.0),
            WheelVector::new(0.0, 1.0),
            WheelVector::new(5.0, 0.0),
        ];
        let desired = [
            WheelVector::new(0.05, 0.0),
            WheelVector::new(1.05, 0.0),
            WheelVector::new(0.0, 1.05),
            WheelVector::new(5.5, 0.0),
        ];

        let r = limiter().enforce_wheel_accel_limit(&prev, &desired, DT_S);
        assert_eq!(r.s, 0.0);
        assert!(r.converged);
    }

    #[test]
    fn test_turning_deceleration() {
        // The speed change is not linear in s, the search must not stall at the start
        let mut desired = all(-1.0, 1.0);
        desired[0] = WheelVector::new(-1.0, 0.0);

        let r = limiter().enforce_wheel_accel_limit(&all(-1.0, 1.0), &desired, DT_S);

        assert!(r.converged);
        assert!(r.s > 0.8 && r.s < 0.9, "s = {}", r.s);
    }

    #[test]
    fn test_iteration_cap() {
        let l = limiter();
        let dt_s = 0.001;

        let mut prev = all(1.0, 0.0);
        let mut desired = all(1.0, 0.0);
        prev[0] = WheelVector::new(-4.5, -2.0);
        desired[0] = WheelVector::new(-5.0, 5.0);

        let r = l.enforce_wheel_accel_limit(&prev, &desired, dt_s);

        // The speed first drops then rises past the limit at s = 0.4773, the search stops short
        // of it on the achievable side
        assert!(!r.converged);
        assert!(r.s > 0.45 && r.s < 0.4773, "s = {}", r.s);

        let limited = prev[0] + (desired[0] - prev[0]) * r.s;
        let max_step = l.max_vel_step(&prev[0], &desired[0], dt_s);
        assert!(limited.norm() - prev[0].norm() <= max_step);
    }

    #[test]
    fn test_running_minimum() {
        let prev = all(0.0, 0.0);
        let mut desired = all(0.5, 0.0);
        desired[2] = WheelVector::new(0.0, -1.0);

        let r = limiter().enforce_wheel_accel_limit(&prev, &desired, DT_S);

        // Only the fastest wheel limits
        assert_near!(r.s, 0.2, 1e-9);
    }

    #[test]
    fn test_steps_within_limits() {
        let l = limiter();
        let prev = [
            WheelVector::new(0.0, 0.0),
            WheelVector::new(1.0, 1.0),
            WheelVector::new(-2.0, 0.5),
            WheelVector::new(0.5, 0.0),
        ];
        let desired = [
            WheelVector::new(1.0, -1.0),
            WheelVector::new(0.2, 0.2),
            WheelVector::new(-1.0, 0.25),
            WheelVector::new(2.0, 0.0),
        ];

        let r = l.enforce_wheel_accel_limit(&prev, &desired, DT_S);
        assert!(r.s >= 0.0 && r.s <= 1.0);

        for i in 0..NUM_WHEELS {
            let limited = prev[i] + (desired[i] - prev[i]) * r.s;
            let change = (limited.norm() - prev[i].norm()).abs();
            let max_step = l.max_vel_step(&prev[i], &desired[i], DT_S);

            assert!(change <= max_step + 1e-6, "wheel {}: {} > {}", i, change, max_step);
        }
    }
}
