//! Unit-vector math on the sphere
//!
//! All positions, grid vertices, and edge normals are unit vectors in
//! earth-centered coordinates: x through the equator at the prime meridian,
//! y through the equator at 90E, z through the north pole. Latitude and
//! longitude exist only at the API boundary; everything internal is dot and
//! cross products.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Tolerance used when deciding whether a vector is of unit length.
pub const UNIT_TOLERANCE: f64 = 1e-7;

/// Three-component vector in earth-centered coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    #[inline]
    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Scalar triple product `self . (a x b)`, the signed volume of the
    /// parallelepiped spanned by the three vectors.
    ///
    /// For unit vectors this is positive when (self, a, b) form a
    /// right-handed set, which is the orientation test used by the
    /// triangle walk.
    #[inline]
    pub fn triple(self, a: Vec3, b: Vec3) -> f64 {
        self.dot(a.cross(b))
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// True when the vector is within [`UNIT_TOLERANCE`] of unit length.
    pub fn is_unit(self) -> bool {
        (self.dot(self) - 1.0).abs() < UNIT_TOLERANCE
    }

    /// Normalize to unit length. Returns `None` for the zero vector.
    pub fn normalized(self) -> Option<Vec3> {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Some(self * (1.0 / len))
        } else {
            None
        }
    }

    /// Angular separation in radians between two unit vectors.
    ///
    /// Uses atan2 of cross and dot, which stays accurate for both very
    /// small and near-antipodal separations where acos loses digits.
    pub fn angle(self, other: Vec3) -> f64 {
        self.cross(other).length().atan2(self.dot(other))
    }

    /// Unit vector midway along the minor arc between two unit vectors.
    /// Returns `None` when the inputs are antipodal.
    pub fn midpoint(self, other: Vec3) -> Option<Vec3> {
        (self + other).normalized()
    }

    /// Rotate this vector by `angle` radians about the axis `axis`
    /// (right-hand rule). `axis` must be a unit vector.
    pub fn rotated(self, axis: Vec3, angle: f64) -> Vec3 {
        let (sin, cos) = angle.sin_cos();
        let d = self.dot(axis) * (1.0 - cos);
        Vec3::new(
            cos * self.x + d * axis.x + sin * (axis.y * self.z - axis.z * self.y),
            cos * self.y + d * axis.y + sin * (axis.z * self.x - axis.x * self.z),
            cos * self.z + d * axis.z + sin * (axis.x * self.y - axis.y * self.x),
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.12}, {:.12}, {:.12})", self.x, self.y, self.z)
    }
}

/// Center of a spherical triangle: the normalized vector sum of its
/// corners. Always strictly inside the triangle for triangles smaller
/// than a hemisphere.
pub fn triangle_center(v0: Vec3, v1: Vec3, v2: Vec3) -> Vec3 {
    // Corners of a valid triangle never sum to zero.
    (v0 + v1 + v2).normalized().unwrap_or(v0)
}

/// Area of the spherical triangle (a, b, c) in steradians, by the
/// van Oosterom-Strackee formula. Signed by vertex order: positive for
/// counterclockwise seen from outside the sphere.
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f64 {
    let num = a.triple(b, c);
    let den = 1.0 + a.dot(b) + b.dot(c) + c.dot(a);
    2.0 * num.atan2(den)
}

/// True when unit vector `u` lies inside or on the boundary of the
/// spherical triangle (v0, v1, v2) with counterclockwise orientation.
pub fn triangle_contains(v0: Vec3, v1: Vec3, v2: Vec3, u: Vec3) -> bool {
    u.triple(v0, v1) >= 0.0 && u.triple(v1, v2) >= 0.0 && u.triple(v2, v0) >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    const Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    const Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    #[test]
    fn cross_follows_right_hand_rule() {
        let c = X.cross(Y);
        assert_relative_eq!(c.z, 1.0);
        assert_relative_eq!(c.x, 0.0);
    }

    #[test]
    fn angle_is_accurate_for_small_separations() {
        let a = Vec3::new(1.0, 1e-9, 0.0).normalized().unwrap();
        assert_relative_eq!(X.angle(a), 1e-9, max_relative = 1e-6);
        assert_relative_eq!(X.angle(Y), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn rotation_moves_x_to_y_about_z() {
        let r = X.rotated(Z, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(r.x, 0.0, epsilon = 1e-15);
        assert_relative_eq!(r.y, 1.0, epsilon = 1e-15);
        assert!(r.is_unit());
    }

    #[test]
    fn octant_triangle_area_is_one_eighth_sphere() {
        // The (x, y, z) octant covers 4*pi/8 steradians.
        assert_relative_eq!(
            triangle_area(X, Y, Z),
            std::f64::consts::PI / 2.0,
            epsilon = 1e-14
        );
        // Reversing the order flips the sign.
        assert_relative_eq!(
            triangle_area(X, Z, Y),
            -std::f64::consts::PI / 2.0,
            epsilon = 1e-14
        );
    }

    #[test]
    fn containment_includes_edges_and_corners() {
        let mid = X.midpoint(Y).unwrap();
        assert!(triangle_contains(X, Y, Z, mid));
        assert!(triangle_contains(X, Y, Z, X));
        assert!(!triangle_contains(X, Y, Z, -Z));
    }
}
