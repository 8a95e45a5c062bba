//! Natural-neighbor (Sibson) horizontal coefficients
//!
//! Conceptually the query point is inserted into the Voronoi tessellation
//! of the surrounding vertices; each neighbor's coefficient is the
//! fraction of the new cell's area stolen from that neighbor's old cell.
//!
//! The computation works on the Delaunay cavity: the connected set of
//! triangles whose circumcircles contain the query point. The cavity
//! boundary vertices are the natural neighbors; the new cell's corners
//! are circumcenters of (query, neighbor, next-neighbor) triangles, and
//! each stolen region is bounded by two of those plus the old Voronoi
//! vertices (cavity-triangle circumcenters) around the neighbor.
//! Spherical polygon areas come from the triangle-fan excess formula.
//!
//! Every degenerate configuration returns `None` and the caller falls
//! through to linear coefficients: that downgrade is a logged warning,
//! never an error.

use std::collections::{HashMap, HashSet};

use geotess_geom::vector::triangle_area;
use geotess_geom::Vec3;
use geotess_model::Grid;

use crate::error::InterpResult;

/// Sibson coefficients for `u`, which lies inside top-level triangle
/// `triangle` of tessellation `tess`. Returns the neighbor vertices and
/// their normalized weights, or `None` when the construction degenerates.
pub fn sibson_coefficients(
    grid: &Grid,
    tess: usize,
    triangle: u32,
    u: Vec3,
) -> InterpResult<Option<(Vec<u32>, Vec<f64>)>> {
    let level = grid.top_level(tess);
    let span = grid.level_span(tess, level);
    let neighbors = grid.neighbors()?;

    // Grow the cavity: triangles whose circumcircle contains u.
    let mut cavity: HashSet<u32> = HashSet::new();
    let mut stack = vec![triangle];
    cavity.insert(triangle);
    while let Some(t) = stack.pop() {
        for &n in &neighbors[t as usize] {
            if !span.contains(n) || cavity.contains(&n) {
                continue;
            }
            let (cc, cos_r) = grid.circumcenter(n)?;
            if cc.dot(u) > cos_r {
                cavity.insert(n);
                stack.push(n);
            }
        }
    }

    // Collect the directed boundary edges (cavity side on the left) and
    // the cavity triangle that owns each.
    let mut boundary: HashMap<u32, (u32, u32)> = HashMap::new();
    for &t in &cavity {
        let tri = grid.triangle(t);
        for k in 0..3 {
            let n = neighbors[t as usize][k];
            if cavity.contains(&n) {
                continue;
            }
            let from = tri[(k + 1) % 3];
            let to = tri[(k + 2) % 3];
            if boundary.insert(from, (to, t)).is_some() {
                // A vertex with two outgoing boundary edges means the
                // cavity is not a simple star: bail out.
                return Ok(None);
            }
        }
    }
    if boundary.len() < 3 {
        return Ok(None);
    }

    // Chain the boundary into one cycle of natural neighbors.
    let start = *boundary.keys().next().expect("boundary is non-empty");
    let mut ring: Vec<(u32, u32)> = Vec::with_capacity(boundary.len());
    let mut v = start;
    loop {
        let &(next, owner) = match boundary.get(&v) {
            Some(e) => e,
            None => return Ok(None),
        };
        ring.push((v, owner));
        v = next;
        if v == start {
            break;
        }
        if ring.len() > boundary.len() {
            return Ok(None);
        }
    }
    if ring.len() != boundary.len() {
        return Ok(None);
    }

    let m = ring.len();
    // New Voronoi corners: circumcenter of (u, b_i, b_{i+1}) sits on the
    // bisector of u against both neighbors.
    let mut corners = Vec::with_capacity(m);
    for i in 0..m {
        let bi = grid.vertex(ring[i].0);
        let bj = grid.vertex(ring[(i + 1) % m].0);
        match circumcenter(u, bi, bj) {
            Some(c) => corners.push(c),
            None => return Ok(None),
        }
    }

    let mut verts = Vec::with_capacity(m);
    let mut weights = Vec::with_capacity(m);
    let mut total = 0.0;
    for i in 0..m {
        // Stolen region of neighbor b_i: one arc of the new cell between
        // the corners shared with b_{i+1} and b_{i-1}, closed by the old
        // Voronoi vertices around b_i (the circumcenters of the cavity
        // triangles incident to it). `owner` holds the boundary edge
        // (b_i, b_{i+1}), so the sweep rotates from there toward the
        // (b_{i-1}, b_i) side.
        let (b, owner) = ring[i];
        let mut poly = vec![corners[i]];
        let mut t = owner;
        loop {
            poly.push(grid.circumcenter(t)?.0);
            let tri = grid.triangle(t);
            // The sweep crosses edges incident to b, so b stays a corner
            // of every visited triangle; anything else is a broken mesh.
            let c = match tri.iter().position(|&x| x == b) {
                Some(c) => c,
                None => return Ok(None),
            };
            let n = neighbors[t as usize][(c + 1) % 3];
            if !cavity.contains(&n) {
                break;
            }
            t = n;
            if poly.len() > cavity.len() + 2 {
                return Ok(None);
            }
        }
        poly.push(corners[(i + m - 1) % m]);
        let area = polygon_area(&poly);
        if !area.is_finite() {
            return Ok(None);
        }
        // Roundoff can push a sliver slightly negative.
        let area = area.max(0.0);
        verts.push(b);
        weights.push(area);
        total += area;
    }
    if total <= 0.0 {
        return Ok(None);
    }
    for w in &mut weights {
        *w /= total;
    }
    Ok(Some((verts, weights)))
}

/// Circumcenter of the spherical triangle (a, b, c), oriented into the
/// triangle's hemisphere.
fn circumcenter(a: Vec3, b: Vec3, c: Vec3) -> Option<Vec3> {
    let cc = (a - b).cross(c - b).normalized()?;
    Some(if cc.dot(a + b + c) < 0.0 { -cc } else { cc })
}

/// Area of a spherical polygon by fanning from its first vertex. The
/// ring orientation determines the sign.
fn polygon_area(ring: &[Vec3]) -> f64 {
    let mut area = 0.0;
    for i in 1..ring.len().saturating_sub(1) {
        area += triangle_area(ring[0], ring[i], ring[i + 1]);
    }
    area.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geotess_model::Grid;

    fn interior_point(grid: &Grid, t: u32, wa: f64, wb: f64, wc: f64) -> Vec3 {
        let [a, b, c] = grid.triangle_vertices(t);
        (a * wa + b * wb + c * wc).normalized().unwrap()
    }

    #[test]
    fn weights_are_a_partition_of_unity() {
        let grid = Grid::icosahedron(3).unwrap();
        let t = grid.level_first_triangle(0, 2) + 17;
        let u = interior_point(&grid, t, 0.5, 0.3, 0.2);
        let t = grid.walk_to_containing(t, u).unwrap();
        let (verts, weights) = sibson_coefficients(&grid, 0, t, u).unwrap().unwrap();
        assert_eq!(verts.len(), weights.len());
        assert!(verts.len() >= 3);
        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(weights.iter().all(|&w| w >= 0.0));
        // The containing triangle's corners participate.
        for v in grid.triangle(t) {
            assert!(verts.contains(&v));
        }
    }

    #[test]
    fn weights_concentrate_near_a_vertex() {
        let grid = Grid::icosahedron(3).unwrap();
        let t = grid.level_first_triangle(0, 2) + 40;
        // Heavily weighted toward corner 0.
        let u = interior_point(&grid, t, 0.999, 0.0005, 0.0005);
        let t2 = grid.walk_to_containing(t, u).unwrap();
        let (verts, weights) = sibson_coefficients(&grid, 0, t2, u).unwrap().unwrap();
        let target = grid.triangle(t)[0];
        let idx = verts.iter().position(|&v| v == target).unwrap();
        assert!(
            weights[idx] > 0.9,
            "weight at the near vertex was {}",
            weights[idx]
        );
    }

    #[test]
    fn centroid_of_a_triangle_spreads_weight() {
        let grid = Grid::icosahedron(2).unwrap();
        let t = grid.level_first_triangle(0, 1) + 5;
        let u = interior_point(&grid, t, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
        let t = grid.walk_to_containing(t, u).unwrap();
        let (verts, weights) = sibson_coefficients(&grid, 0, t, u).unwrap().unwrap();
        // No single vertex dominates at a centroid.
        for (v, w) in verts.iter().zip(&weights) {
            assert!(*w < 0.6, "vertex {} took weight {}", v, w);
        }
        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
}
