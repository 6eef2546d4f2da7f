// Angle and range helpers shared by the kinematics and steering code

use std::f64::consts::{PI, TAU};

/// One full turn in radians
pub const TWO_PI: f64 = TAU;

/// Modulo that always lands in `[0, modulus)`, for any sign of `x`
pub fn positive_mod(x: f64, modulus: f64) -> f64 {
    let r = x.rem_euclid(modulus);
    // rem_euclid can round up to exactly `modulus` for tiny negative inputs
    if r >= modulus { 0.0 } else { r }
}

/// Canonicalize an angle in radians to `[0, 2π)`
pub fn canonical_angle(radians: f64) -> f64 {
    positive_mod(radians, TWO_PI)
}

/// Linearly map `x` from `[orig_min, orig_max]` onto `[new_min, new_max]`
///
/// The ranges are not clamped, so values outside the original range are
/// extrapolated. A zero-width original range yields a non-finite result.
pub fn transformation(orig_min: f64, orig_max: f64, new_min: f64, new_max: f64, x: f64) -> f64 {
    new_min + ((new_max - new_min) / (orig_max - orig_min)) * (x - orig_min)
}

/// Shortest signed rotation (radians) that takes `from` to `to`, in `(-π, π]`
pub fn angular_difference(from: f64, to: f64) -> f64 {
    let mut error = canonical_angle(to) - canonical_angle(from);
    if error.abs() > PI {
        error -= error.signum() * TWO_PI;
    }
    error
}

/// `signum` that reports 0 for 0 (and for NaN), unlike `f64::signum`
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
