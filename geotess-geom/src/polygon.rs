//! Spherical polygons
//!
//! Closed polygons on the unit sphere whose edges are minor great-circle
//! arcs. Containment is decided by arc-crossing parity against a reference
//! point of known state, so polygons larger than a hemisphere work too.

use crate::vector::Vec3;

/// A closed polygon on the sphere.
///
/// The boundary is a ring of unit vectors; consecutive points must be
/// closer than pi radians so each edge is an unambiguous minor arc.
#[derive(Debug, Clone)]
pub struct SphericalPolygon {
    boundary: Vec<Vec3>,
    reference: Vec3,
    reference_inside: bool,
}

impl SphericalPolygon {
    /// Build a polygon with an explicit reference point whose containment
    /// state is known. Returns `None` for fewer than three boundary points.
    pub fn new(boundary: Vec<Vec3>, reference: Vec3, reference_inside: bool) -> Option<Self> {
        if boundary.len() < 3 {
            return None;
        }
        Some(Self {
            boundary,
            reference,
            reference_inside,
        })
    }

    /// Build a polygon whose interior contains the normalized centroid of
    /// its boundary. Suitable for polygons smaller than a hemisphere.
    pub fn from_boundary(boundary: Vec<Vec3>) -> Option<Self> {
        let mut sum = Vec3::default();
        for &v in &boundary {
            sum = sum + v;
        }
        let reference = sum.normalized()?;
        Self::new(boundary, reference, true)
    }

    pub fn boundary(&self) -> &[Vec3] {
        &self.boundary
    }

    /// True when unit vector `u` is inside the polygon.
    ///
    /// The arc from the reference point to `u` is tested for proper
    /// crossings against every edge; odd parity flips the reference state.
    /// A point exactly on an edge counts as inside. A query antipodal to
    /// the reference (no unique connecting arc) hops through an
    /// orthogonal waypoint first.
    pub fn contains(&self, u: Vec3) -> bool {
        if self.reference.angle(u) < 1e-15 {
            return self.reference_inside;
        }
        if self.reference.dot(u) < -1.0 + 1e-12 {
            let axis = if self.reference.z.abs() < 0.9 {
                Vec3::new(0.0, 0.0, 1.0)
            } else {
                Vec3::new(1.0, 0.0, 0.0)
            };
            // Orthogonal to both the reference and its antipode.
            if let Some(w) = self.reference.cross(axis).normalized() {
                let w_inside = self.contains_from(self.reference, self.reference_inside, w);
                return self.contains_from(w, w_inside, u);
            }
        }
        self.contains_from(self.reference, self.reference_inside, u)
    }

    fn contains_from(&self, from: Vec3, from_inside: bool, u: Vec3) -> bool {
        let mut crossings = 0usize;
        let n = self.boundary.len();
        for i in 0..n {
            let a = self.boundary[i];
            let b = self.boundary[(i + 1) % n];
            if on_arc(a, b, u) {
                return true;
            }
            if arcs_cross(from, u, a, b) {
                crossings += 1;
            }
        }
        if crossings % 2 == 0 {
            from_inside
        } else {
            !from_inside
        }
    }
}

/// True when `u` lies on the minor arc from `a` to `b`.
fn on_arc(a: Vec3, b: Vec3, u: Vec3) -> bool {
    u.triple(a, b).abs() < 1e-15 && a.dot(u) >= a.dot(b) && b.dot(u) >= a.dot(b)
}

/// True when the minor arcs (p, q) and (a, b) properly cross.
fn arcs_cross(p: Vec3, q: Vec3, a: Vec3, b: Vec3) -> bool {
    // Each arc's endpoints must straddle the other's plane.
    let sa = a.triple(p, q);
    let sb = b.triple(p, q);
    if sa * sb >= 0.0 {
        return false;
    }
    let sp = p.triple(a, b);
    let sq = q.triple(a, b);
    if sp * sq >= 0.0 {
        return false;
    }
    // Both candidate plane intersections are antipodal; the crossing is
    // real only when it lies on the near side of both arcs.
    if let Some(x) = p.cross(q).cross(a.cross(b)).normalized() {
        let hit = if x.dot(p + q) >= 0.0 { x } else { -x };
        hit.dot(a + b) >= 0.0
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ll(lat: f64, lon: f64) -> Vec3 {
        let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
        let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
        Vec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    fn square() -> SphericalPolygon {
        SphericalPolygon::from_boundary(vec![
            ll(-20.0, -20.0),
            ll(-20.0, 20.0),
            ll(20.0, 20.0),
            ll(20.0, -20.0),
        ])
        .unwrap()
    }

    #[test]
    fn centroid_is_inside_and_antipode_is_not() {
        let poly = square();
        assert!(poly.contains(ll(0.0, 0.0)));
        assert!(poly.contains(ll(10.0, -15.0)));
        assert!(!poly.contains(ll(0.0, 180.0)));
        assert!(!poly.contains(ll(60.0, 0.0)));
        assert!(!poly.contains(ll(0.0, 45.0)));
    }

    #[test]
    fn boundary_points_count_as_inside() {
        let poly = square();
        assert!(poly.contains(ll(-20.0, 20.0)));
    }

    #[test]
    fn inverted_reference_flips_the_interior() {
        let boundary = vec![
            ll(-20.0, -20.0),
            ll(-20.0, 20.0),
            ll(20.0, 20.0),
            ll(20.0, -20.0),
        ];
        let poly = SphericalPolygon::new(boundary, ll(0.0, 180.0), true).unwrap();
        // Everything far from the small square is now "inside".
        assert!(poly.contains(ll(60.0, 0.0)));
        assert!(!poly.contains(ll(0.0, 0.0)));
    }

    #[test]
    fn too_few_points_is_rejected() {
        assert!(SphericalPolygon::from_boundary(vec![ll(0.0, 0.0), ll(1.0, 1.0)]).is_none());
    }
}
