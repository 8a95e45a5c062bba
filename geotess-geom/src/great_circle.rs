//! Great circles
//!
//! A [`GreatCircle`] is the shortest arc between two unit vectors, carried
//! as (first, normal) so that points along it come from a single rotation.

use crate::vector::Vec3;

/// The minor great-circle arc from `first` to `last`.
#[derive(Debug, Clone, Copy)]
pub struct GreatCircle {
    first: Vec3,
    last: Vec3,
    /// Unit normal of the plane, `first x last` normalized.
    normal: Vec3,
    /// Arc length in radians.
    distance: f64,
}

impl GreatCircle {
    /// Build the arc from `first` to `last`. Returns `None` when the two
    /// points are identical or antipodal, where the plane is undefined.
    pub fn new(first: Vec3, last: Vec3) -> Option<Self> {
        let normal = first.cross(last).normalized()?;
        Some(Self {
            first,
            last,
            normal,
            distance: first.angle(last),
        })
    }

    pub fn first(&self) -> Vec3 {
        self.first
    }

    pub fn last(&self) -> Vec3 {
        self.last
    }

    /// Unit normal of the great-circle plane.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// Arc length in radians.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Unit vector at `dist` radians from `first` along the arc.
    pub fn point_at(&self, dist: f64) -> Vec3 {
        let (sin, cos) = dist.sin_cos();
        // Rotate `first` about the normal: the in-plane orthogonal
        // direction is normal x first.
        let ortho = self.normal.cross(self.first);
        self.first * cos + ortho * sin
    }

    /// Unit vector at fraction `f` of the way from `first` to `last`.
    pub fn fraction(&self, f: f64) -> Vec3 {
        self.point_at(f * self.distance)
    }

    /// Azimuth (radians clockwise from north) of the arc as it leaves
    /// `first`. `None` at the poles where azimuth is undefined.
    pub fn azimuth(&self) -> Option<f64> {
        azimuth(self.first, self.last)
    }
}

/// Azimuth in radians, clockwise from north, of the direction from `from`
/// toward `to`. `None` when `from` is a pole or the points coincide.
pub fn azimuth(from: Vec3, to: Vec3) -> Option<f64> {
    let north = Vec3::new(0.0, 0.0, 1.0);
    let east = north.cross(from).normalized()?;
    let n = from.cross(north.cross(from)).normalized()?;
    let dir = to - from * from.dot(to);
    let (de, dn) = (dir.dot(east), dir.dot(n));
    if de == 0.0 && dn == 0.0 {
        return None;
    }
    Some(de.atan2(dn))
}
