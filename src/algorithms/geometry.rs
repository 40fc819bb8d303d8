//! Planar geometry primitives
//!
//! Angles are radians. Bearings and headings are compass style: measured
//! clockwise from +y ("map north"), so `bearing((0,0), (1,0)) == pi/2`.
//! [`rotate_2d`] is the standard counter-clockwise rotation; [`rotate_compass`]
//! rotates in the heading sense and is what frame conversions use.

use nalgebra::{Matrix2, Vector2, Vector3};
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Wrap an angle into (-pi, pi] by repeated +-2pi steps
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }

    // Bring huge magnitudes close first so the loops stay short
    let mut a = if angle.abs() > 16.0 * TWO_PI {
        angle % TWO_PI
    } else {
        angle
    };
    while a > PI {
        a -= TWO_PI;
    }
    while a <= -PI {
        a += TWO_PI;
    }
    a
}

/// Signed difference `b - a`, normalized
pub fn angle_difference(a: f64, b: f64) -> f64 {
    normalize_angle(b - a)
}

/// Compass bearing from `from` to `to`
pub fn bearing(from: &Vector2<f64>, to: &Vector2<f64>) -> f64 {
    let delta = to - from;
    delta.x.atan2(delta.y)
}

/// Counter-clockwise rotation of `v` by `angle`
pub fn rotate_2d(v: &Vector2<f64>, angle: f64) -> Vector2<f64> {
    let (s, c) = angle.sin_cos();
    Matrix2::new(c, -s, s, c) * v
}

/// Clockwise rotation of `v` by `angle`, the heading sense
pub fn rotate_compass(v: &Vector2<f64>, angle: f64) -> Vector2<f64> {
    rotate_2d(v, -angle)
}

/// Unit vector pointing along a compass heading
pub fn heading_vector(heading: f64) -> Vector2<f64> {
    let (s, c) = heading.sin_cos();
    Vector2::new(s, c)
}

/// Clamp into the domain of `acos`/`asin`
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

/// Unsigned angle between two vectors; zero vectors give 0
pub fn angle_between(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    let norms = a.norm() * b.norm();
    if norms < f64::EPSILON {
        return 0.0;
    }
    clamp_unit(a.dot(b) / norms).acos()
}

/// Drop the vertical component
pub fn horizontal(v: &Vector3<f64>) -> Vector2<f64> {
    Vector2::new(v.x, v.y)
}

pub fn horizontal_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (horizontal(a) - horizontal(b)).norm()
}

/// Rotate a device-frame direction (x right, y forward) into the map frame
/// for a device facing `heading`, projected onto the horizontal plane.
/// Returns `None` when the direction is (almost) vertical.
pub fn local_to_map_direction(direction_local: &Vector3<f64>, heading: f64) -> Option<Vector2<f64>> {
    let flat = horizontal(direction_local);
    let flat = flat.try_normalize(1e-9)?;
    Some(rotate_compass(&flat, heading))
}

/// Closest point to `p` on the segment `a`-`b`
pub fn project_onto_segment(p: &Vector2<f64>, a: &Vector2<f64>, b: &Vector2<f64>) -> Vector2<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < f64::EPSILON {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}
