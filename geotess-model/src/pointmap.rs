//! Point map
//!
//! A point is a concrete (vertex, layer, node-in-profile) that carries
//! data. The map enumerates every such point densely and converts between
//! point ids and triples in O(1) both ways: the forward direction is a
//! flat triple table, the reverse a first-point table per (vertex, layer)
//! plus the node offset, which works because nodes are contiguous within
//! a profile.
//!
//! Binding an active-region polygon restricts enumeration to vertices
//! inside it; everything else maps to the [`OUTSIDE_POINT`] sentinel. The
//! id assignment is stable for one active-region configuration and is
//! rebuilt when it changes.

use geotess_geom::{SphericalPolygon, Vec3};

use crate::grid::Grid;
use crate::profile::Profile;

/// Sentinel id for positions with no enumerated point: outside the active
/// region, or on an Empty profile.
pub const OUTSIDE_POINT: i32 = -1;

/// Dense enumeration of the real points of a model.
#[derive(Debug, Clone)]
pub struct PointMap {
    /// (vertex, layer, node) of each point id.
    triples: Vec<(u32, u32, u32)>,
    /// First point id of each (vertex, layer), `OUTSIDE_POINT` when the
    /// profile contributes none.
    first_point: Vec<i32>,
    nlayers: usize,
}

impl PointMap {
    /// Enumerate the points of `profiles` (vertex-major layout,
    /// `profiles[vertex * nlayers + layer]`), honoring an optional active
    /// region.
    pub fn build(
        grid: &Grid,
        nlayers: usize,
        profiles: &[Profile],
        active_region: Option<&SphericalPolygon>,
    ) -> Self {
        let nvertices = grid.nvertices();
        let mut triples = Vec::new();
        let mut first_point = vec![OUTSIDE_POINT; nvertices * nlayers];
        for vertex in 0..nvertices {
            let inside = active_region
                .map(|poly| poly.contains(grid.vertex(vertex as u32)))
                .unwrap_or(true);
            if !inside {
                continue;
            }
            for layer in 0..nlayers {
                let profile = &profiles[vertex * nlayers + layer];
                let nnodes = profile.nnodes();
                if nnodes == 0 {
                    continue;
                }
                first_point[vertex * nlayers + layer] = triples.len() as i32;
                for node in 0..nnodes {
                    triples.push((vertex as u32, layer as u32, node as u32));
                }
            }
        }
        Self {
            triples,
            first_point,
            nlayers,
        }
    }

    pub fn npoints(&self) -> usize {
        self.triples.len()
    }

    /// The (vertex, layer, node) of point `p`.
    pub fn point_to_triple(&self, p: i32) -> Option<(u32, u32, u32)> {
        if p < 0 {
            return None;
        }
        self.triples.get(p as usize).copied()
    }

    /// The point id of (vertex, layer, node), or [`OUTSIDE_POINT`] when
    /// that node is not enumerated.
    pub fn triple_to_point(&self, vertex: u32, layer: u32, node: u32) -> i32 {
        let slot = vertex as usize * self.nlayers + layer as usize;
        match self.first_point.get(slot) {
            Some(&first) if first >= 0 => {
                let p = first + node as i32;
                // The node must belong to the same profile.
                match self.triples.get(p as usize) {
                    Some(&(v, l, n)) if v == vertex && l == layer && n == node => p,
                    _ => OUTSIDE_POINT,
                }
            }
            _ => OUTSIDE_POINT,
        }
    }

    /// Iterate all (point id, vertex, layer, node).
    pub fn iter(&self) -> impl Iterator<Item = (i32, u32, u32, u32)> + '_ {
        self.triples
            .iter()
            .enumerate()
            .map(|(p, &(v, l, n))| (p as i32, v, l, n))
    }

    /// Radius in km of point `p` within `profiles`.
    pub fn point_radius(&self, p: i32, profiles: &[Profile]) -> Option<f64> {
        let (vertex, layer, node) = self.point_to_triple(p)?;
        let profile = &profiles[vertex as usize * self.nlayers + layer as usize];
        profile.node_radius(node as usize).map(f64::from)
    }

    /// Unit vector of point `p`.
    pub fn point_unit_vector(&self, p: i32, grid: &Grid) -> Option<Vec3> {
        let (vertex, _, _) = self.point_to_triple(p)?;
        Some(grid.vertex(vertex))
    }

    /// Attribute value at point `p`, NaN when `p` is the outside
    /// sentinel.
    pub fn point_value(&self, p: i32, attr: usize, profiles: &[Profile]) -> f64 {
        match self.point_to_triple(p) {
            Some((vertex, layer, node)) => profiles
                [vertex as usize * self.nlayers + layer as usize]
                .value(node as usize, attr),
            None => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataColumn;

    fn profiles_for(grid: &Grid) -> Vec<Profile> {
        // Two layers per vertex: an NPoint with 3 nodes and a Constant.
        let mut profiles = Vec::new();
        for v in 0..grid.nvertices() {
            let mut col = DataColumn::new(crate::data::DataType::Float, 3, 1).unwrap();
            for node in 0..3 {
                col.set(node, 0, (v * 10 + node) as f64).unwrap();
            }
            profiles.push(
                Profile::npoint(vec![5000.0, 5500.0, 6000.0], col).unwrap(),
            );
            profiles.push(
                Profile::constant(6000.0, 6371.0, DataColumn::floats(vec![v as f32])).unwrap(),
            );
        }
        profiles
    }

    #[test]
    fn dense_enumeration_covers_all_real_nodes() {
        let grid = Grid::icosahedron(1).unwrap();
        let profiles = profiles_for(&grid);
        let map = PointMap::build(&grid, 2, &profiles, None);
        assert_eq!(map.npoints(), grid.nvertices() * 4);
        // Forward and reverse agree everywhere.
        for (p, v, l, n) in map.iter() {
            assert_eq!(map.triple_to_point(v, l, n), p);
        }
        assert_eq!(map.point_to_triple(OUTSIDE_POINT), None);
        assert_eq!(map.triple_to_point(0, 0, 7), OUTSIDE_POINT);
    }

    #[test]
    fn empty_profiles_contribute_no_points() {
        let grid = Grid::icosahedron(1).unwrap();
        let mut profiles = profiles_for(&grid);
        profiles[0] = Profile::empty(5000.0, 6000.0).unwrap();
        let map = PointMap::build(&grid, 2, &profiles, None);
        assert_eq!(map.npoints(), grid.nvertices() * 4 - 3);
        assert_eq!(map.triple_to_point(0, 0, 0), OUTSIDE_POINT);
        // Vertex 0 layer 1 still has its point.
        let p = map.triple_to_point(0, 1, 0);
        assert!(p >= 0);
        assert_eq!(map.point_value(p, 0, &profiles), 0.0);
    }

    #[test]
    fn active_region_excludes_outside_vertices() {
        let grid = Grid::icosahedron(1).unwrap();
        let profiles = profiles_for(&grid);
        // A small cap around vertex 0.
        let center = grid.vertex(0);
        let axis = if center.z.abs() < 0.9 {
            Vec3::new(0.0, 0.0, 1.0)
        } else {
            Vec3::new(1.0, 0.0, 0.0)
        };
        let east = center.cross(axis).normalized().unwrap();
        let north = center.cross(east);
        let ring: Vec<Vec3> = (0..12)
            .map(|i| {
                let a = i as f64 / 12.0 * std::f64::consts::TAU;
                (center * 0.35f64.cos()
                    + (east * a.cos() + north * a.sin()) * 0.35f64.sin())
                .normalized()
                .unwrap()
            })
            .collect();
        let poly = SphericalPolygon::new(ring, center, true).unwrap();
        let map = PointMap::build(&grid, 2, &profiles, Some(&poly));
        // Only vertex 0 falls inside the cap (icosahedron vertices are
        // ~63 degrees apart, the cap radius is 0.35 rad ~ 20 degrees).
        assert_eq!(map.npoints(), 4);
        let (v, _, _) = map.point_to_triple(0).unwrap();
        assert_eq!(v, 0);
        assert_eq!(map.triple_to_point(1, 0, 0), OUTSIDE_POINT);
    }

    #[test]
    fn point_accessors_reach_through_profiles() {
        let grid = Grid::icosahedron(1).unwrap();
        let profiles = profiles_for(&grid);
        let map = PointMap::build(&grid, 2, &profiles, None);
        let p = map.triple_to_point(2, 0, 1);
        assert_eq!(map.point_radius(p, &profiles), Some(5500.0));
        assert_eq!(map.point_value(p, 0, &profiles), 21.0);
        assert_eq!(map.point_unit_vector(p, &grid), Some(grid.vertex(2)));
    }
}
