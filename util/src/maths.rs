//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Linearly interpolate between `a` and `b`, with `s = 0` giving `a` and `s = 1` giving `b`.
///
/// `s` is not clamped.
pub fn interpolate<T>(a: T, b: T, s: T) -> T
where
    T: Float,
{
    a + (b - a) * s
}

pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Wrap an angle into the range (-pi, pi].
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float + FloatConst,
{
    let pi_t = T::PI();
    let tau_t = T::TAU();

    let wrapped = rem_euclid(angle + pi_t, tau_t) - pi_t;

    if wrapped <= -pi_t {
        wrapped + tau_t
    } else {
        wrapped
    }
}

/// Get the signed angular distance from `from` to `to`.
///
/// The shortest way round is taken, so the result is always in (-pi, pi]. Positive distances are
/// anticlockwise.
pub fn get_ang_dist<T>(from: T, to: T) -> T
where
    T: Float + FloatConst,
{
    wrap_pi(to - from)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
/// This result is not an element of the function's codomain, but it is the
/// closest floating point number in the real numbers and thus fulfills the
/// property `self == self.div_euclid(rhs) * rhs + self.rem_euclid(rhs)`
/// approximatively.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}
