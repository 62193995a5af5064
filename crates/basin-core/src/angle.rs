//! Angle helpers.  All angles are radians in the canonical range (−π, π].

use std::f64::consts::{PI, TAU};

/// Wrap `a` into (−π, π].
pub fn normalize_angle(a: f64) -> f64 {
    if !a.is_finite() || (a > -PI && a <= PI) {
        return a;
    }
    let mut r = a.rem_euclid(TAU); // [0, 2π)
    if r > PI {
        r -= TAU;
    }
    // rem_euclid can land exactly on 2π - ε rounding to -π; keep π instead.
    if r <= -PI {
        r += TAU;
    }
    r
}

/// Signed separation `to − from`, taken modulo 2π with the smallest magnitude.
pub fn angle_separation(from: f64, to: f64) -> f64 {
    normalize_angle(to - from)
}

/// Absolute angular distance in [0, π].
pub fn angle_distance(a: f64, b: f64) -> f64 {
    angle_separation(a, b).abs()
}

/// Mid-point of the short arc between `a` and `b`.
pub fn angle_midpoint(a: f64, b: f64) -> f64 {
    normalize_angle(a + angle_separation(a, b) / 2.0)
}

#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}
