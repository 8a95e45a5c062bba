//! Interpolation positions
//!
//! A [`Position`] borrows a model immutably and carries the state of one
//! query point: the containing triangle, the horizontal coefficients over
//! grid vertices, and the radial coefficients over each vertex's profile
//! nodes. Setters locate the point and recompute coefficients; getters
//! combine them with model values. A failed set leaves the previous
//! state in place.
//!
//! Triangle walks warm-start from the previous query's triangle on each
//! tessellation, so nearby queries cost a few orientation tests.

use std::collections::HashMap;
use std::str::FromStr;

use log::warn;

use geotess_geom::Vec3;
use geotess_model::profile::Profile;
use geotess_model::{Model, OUTSIDE_POINT};

use crate::error::{InterpError, InterpResult};
use crate::natural_neighbor::sibson_coefficients;
use crate::spline::SplineBasis;

/// Horizontal interpolator choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalInterpolator {
    Linear,
    NaturalNeighbor,
}

impl FromStr for HorizontalInterpolator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LINEAR" => Ok(Self::Linear),
            "NATURAL_NEIGHBOR" | "NATURALNEIGHBOR" => Ok(Self::NaturalNeighbor),
            _ => Err(format!("unknown horizontal interpolator {:?}", s)),
        }
    }
}

/// Radial interpolator choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadialInterpolator {
    Linear,
    CubicSpline,
}

impl FromStr for RadialInterpolator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LINEAR" => Ok(Self::Linear),
            "CUBIC_SPLINE" | "CUBICSPLINE" => Ok(Self::CubicSpline),
            _ => Err(format!("unknown radial interpolator {:?}", s)),
        }
    }
}

/// Committed state of the last successful set.
#[derive(Debug, Clone)]
struct State {
    u: Vec3,
    radius: f64,
    layer: usize,
    triangle: u32,
    vertices: Vec<u32>,
    hcoeffs: Vec<f64>,
    /// Per participating vertex: (node index, radial weight). Empty for
    /// vertices whose profile carries no data.
    radial: Vec<Vec<(usize, f64)>>,
    radius_out_of_range: bool,
}

/// One interpolation cursor over a model.
pub struct Position<'a> {
    model: &'a Model,
    horizontal: HorizontalInterpolator,
    radial_kind: RadialInterpolator,
    /// Warm-start triangle per tessellation.
    hints: Vec<Option<u32>>,
    /// Spline bases per (vertex, layer); `None` caches a profile that
    /// cannot carry a spline and falls back to linear.
    splines: HashMap<(u32, usize), Option<SplineBasis>>,
    state: Option<State>,
}

impl<'a> Position<'a> {
    pub fn new(
        model: &'a Model,
        horizontal: HorizontalInterpolator,
        radial: RadialInterpolator,
    ) -> Self {
        Self {
            model,
            horizontal,
            radial_kind: radial,
            hints: vec![None; model.grid().ntessellations()],
            splines: HashMap::new(),
            state: None,
        }
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    pub fn horizontal_interpolator(&self) -> HorizontalInterpolator {
        self.horizontal
    }

    pub fn radial_interpolator(&self) -> RadialInterpolator {
        self.radial_kind
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    /// Position at unit vector `u` and radius `radius` km within `layer`.
    /// A radius outside the layer pins to the nearer boundary and raises
    /// the out-of-range flag.
    pub fn set(&mut self, layer: usize, u: Vec3, radius: f64) -> InterpResult<()> {
        self.check_layer(layer)?;
        let tess = self.model.metadata().tessellation_of(layer);
        let (triangle, vertices, hcoeffs) = self.compute_horizontal(u, tess)?;
        let mut out_of_range = false;
        let mut radial = Vec::with_capacity(vertices.len());
        for &v in &vertices {
            radial.push(self.radial_coefficients(v, layer, radius, &mut out_of_range));
        }
        self.state = Some(State {
            u,
            radius,
            layer,
            triangle,
            vertices,
            hcoeffs,
            radial,
            radius_out_of_range: out_of_range,
        });
        Ok(())
    }

    /// Position at the top of `layer`: the radial target is the layer's
    /// interpolated top radius at `u`.
    pub fn set_top(&mut self, layer: usize, u: Vec3) -> InterpResult<()> {
        self.check_layer(layer)?;
        let tess = self.model.metadata().tessellation_of(layer);
        let (_, vertices, hcoeffs) = self.compute_horizontal(u, tess)?;
        let radius = Self::blend(&vertices, &hcoeffs, |v| {
            self.model.layer_radius_top(v, layer)
        });
        self.set(layer, u, radius)
    }

    /// Position at the bottom of `layer`.
    pub fn set_bottom(&mut self, layer: usize, u: Vec3) -> InterpResult<()> {
        self.check_layer(layer)?;
        let tess = self.model.metadata().tessellation_of(layer);
        let (_, vertices, hcoeffs) = self.compute_horizontal(u, tess)?;
        let radius = Self::blend(&vertices, &hcoeffs, |v| {
            self.model.layer_radius_bottom(v, layer)
        });
        self.set(layer, u, radius)
    }

    /// Position at (u, radius) with the layer derived from the radius:
    /// layers are scanned from the top down, and a radius equal to a
    /// shared boundary lands in the upper layer.
    pub fn set_at_radius(&mut self, u: Vec3, radius: f64) -> InterpResult<()> {
        let nlayers = self.model.nlayers();
        let mut horizontal_by_tess: HashMap<usize, (Vec<u32>, Vec<f64>)> = HashMap::new();
        let mut chosen = 0;
        for layer in (0..nlayers).rev() {
            let tess = self.model.metadata().tessellation_of(layer);
            if !horizontal_by_tess.contains_key(&tess) {
                let (_, vertices, hcoeffs) = self.compute_horizontal(u, tess)?;
                horizontal_by_tess.insert(tess, (vertices, hcoeffs));
            }
            let (vertices, hcoeffs) = &horizontal_by_tess[&tess];
            let bottom = Self::blend(vertices, hcoeffs, |v| {
                self.model.layer_radius_bottom(v, layer)
            });
            if radius >= bottom || layer == 0 {
                chosen = layer;
                break;
            }
        }
        self.set(chosen, u, radius)
    }

    /// Position from geographic coordinates: latitude and longitude in
    /// degrees, depth in km below the model's earth surface.
    pub fn set_geographic(
        &mut self,
        layer: usize,
        lat_degrees: f64,
        lon_degrees: f64,
        depth_km: f64,
    ) -> InterpResult<()> {
        let shape = self.model.metadata().earth_shape();
        let u = shape.unit_vector_degrees(lat_degrees, lon_degrees);
        let radius = shape.radius_at(u) - depth_km;
        self.set(layer, u, radius)
    }

    /// Retarget to a sibling model sharing the same grid. Horizontal
    /// state is copied verbatim; radial coefficients are recomputed from
    /// the stored layer and radius against the new model's profiles. No
    /// triangle walk happens.
    pub fn set_model(self, model: &Model) -> InterpResult<Position<'_>> {
        if model.grid().grid_id() != self.model.grid().grid_id() {
            return Err(InterpError::GridMismatch {
                current: self.model.grid().grid_id().to_owned(),
                requested: model.grid().grid_id().to_owned(),
            });
        }
        let mut next = Position {
            model,
            horizontal: self.horizontal,
            radial_kind: self.radial_kind,
            hints: self.hints,
            splines: HashMap::new(),
            state: None,
        };
        if let Some(state) = self.state {
            let mut out_of_range = false;
            let mut radial = Vec::with_capacity(state.vertices.len());
            for &v in &state.vertices {
                radial.push(next.radial_coefficients(
                    v,
                    state.layer,
                    state.radius,
                    &mut out_of_range,
                ));
            }
            next.state = Some(State {
                radial,
                radius_out_of_range: out_of_range,
                ..state
            });
        }
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    fn state(&self) -> InterpResult<&State> {
        self.state.as_ref().ok_or(InterpError::NotPositioned)
    }

    pub fn unit_vector(&self) -> InterpResult<Vec3> {
        Ok(self.state()?.u)
    }

    pub fn radius(&self) -> InterpResult<f64> {
        Ok(self.state()?.radius)
    }

    pub fn layer(&self) -> InterpResult<usize> {
        Ok(self.state()?.layer)
    }

    /// Depth in km below the model's earth surface.
    pub fn depth(&self) -> InterpResult<f64> {
        let state = self.state()?;
        let shape = self.model.metadata().earth_shape();
        Ok(shape.radius_at(state.u) - state.radius)
    }

    pub fn latitude_degrees(&self) -> InterpResult<f64> {
        let state = self.state()?;
        Ok(self.model.metadata().earth_shape().latitude_degrees(state.u))
    }

    pub fn longitude_degrees(&self) -> InterpResult<f64> {
        let state = self.state()?;
        Ok(self
            .model
            .metadata()
            .earth_shape()
            .longitude_degrees(state.u))
    }

    /// True when the last set's radius fell outside its layer and was
    /// pinned to the nearer boundary.
    pub fn radius_out_of_range(&self) -> InterpResult<bool> {
        Ok(self.state()?.radius_out_of_range)
    }

    pub fn get_triangle(&self) -> InterpResult<u32> {
        Ok(self.state()?.triangle)
    }

    pub fn get_vertices(&self) -> InterpResult<&[u32]> {
        Ok(&self.state()?.vertices)
    }

    pub fn get_horizontal_coefficients(&self) -> InterpResult<&[f64]> {
        Ok(&self.state()?.hcoeffs)
    }

    /// Per participating vertex, the (node, weight) pairs of the radial
    /// interpolation. Empty for vertices whose profile carries no data.
    pub fn get_radial_coefficients(&self) -> InterpResult<&[Vec<(usize, f64)>]> {
        Ok(&self.state()?.radial)
    }

    /// Interpolated value of attribute `attr`. NaN when any
    /// participating node holds NaN there, or when a participating
    /// profile is Empty.
    pub fn get_value(&self, attr: usize) -> InterpResult<f64> {
        let state = self.state()?;
        let mut total = 0.0;
        for ((&v, &w), nodes) in state
            .vertices
            .iter()
            .zip(&state.hcoeffs)
            .zip(&state.radial)
        {
            if w == 0.0 {
                continue;
            }
            if nodes.is_empty() {
                return Ok(f64::NAN);
            }
            let profile = self.model.profile(v, state.layer);
            let mut value = 0.0;
            for &(node, rc) in nodes {
                value += rc * profile.value(node, attr);
            }
            total += w * value;
        }
        Ok(total)
    }

    /// Interpolated value of the attribute with the given name.
    pub fn get_value_by_name(&self, attr_name: &str) -> InterpResult<f64> {
        let attr = self.model.metadata().attribute_index(attr_name)?;
        self.get_value(attr)
    }

    /// Radial derivative d(value)/d(radius) of attribute `attr` at the
    /// current position, per km.
    pub fn get_radial_gradient(&mut self, attr: usize) -> InterpResult<f64> {
        let state = self.state.clone().ok_or(InterpError::NotPositioned)?;
        let mut total = 0.0;
        for (&v, &w) in state.vertices.iter().zip(&state.hcoeffs) {
            if w == 0.0 {
                continue;
            }
            let d = self.radial_derivative(v, state.layer, state.radius, attr);
            total += w * d;
        }
        Ok(total)
    }

    /// Point-identifier weights of the current position; weights sum
    /// to 1. Nodes outside the active region, and vertices with Empty
    /// profiles, accumulate on [`OUTSIDE_POINT`].
    pub fn get_coefficients(&self) -> InterpResult<HashMap<i32, f64>> {
        let mut map = HashMap::new();
        self.accumulate_coefficients(&mut map, 1.0)?;
        Ok(map)
    }

    /// Add this position's point weights, scaled by `scale`, into `map`.
    /// Used by path integration.
    pub fn accumulate_coefficients(
        &self,
        map: &mut HashMap<i32, f64>,
        scale: f64,
    ) -> InterpResult<()> {
        let state = self.state()?;
        let pointmap = self.model.point_map();
        for ((&v, &w), nodes) in state
            .vertices
            .iter()
            .zip(&state.hcoeffs)
            .zip(&state.radial)
        {
            if w == 0.0 {
                continue;
            }
            if nodes.is_empty() {
                *map.entry(OUTSIDE_POINT).or_insert(0.0) += w * scale;
                continue;
            }
            for &(node, rc) in nodes {
                if rc == 0.0 {
                    continue;
                }
                let p = pointmap.triple_to_point(v, state.layer as u32, node as u32);
                *map.entry(p).or_insert(0.0) += w * rc * scale;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Coefficient computation
    // ------------------------------------------------------------------

    fn check_layer(&self, layer: usize) -> InterpResult<()> {
        let nlayers = self.model.nlayers();
        if layer >= nlayers {
            return Err(InterpError::LayerOutOfRange { layer, nlayers });
        }
        Ok(())
    }

    fn blend(vertices: &[u32], coeffs: &[f64], f: impl Fn(u32) -> f64) -> f64 {
        vertices
            .iter()
            .zip(coeffs)
            .map(|(&v, &w)| w * f(v))
            .sum()
    }

    /// Containing top-level triangle plus horizontal coefficients on the
    /// given tessellation.
    fn compute_horizontal(
        &mut self,
        u: Vec3,
        tess: usize,
    ) -> InterpResult<(u32, Vec<u32>, Vec<f64>)> {
        if !u.is_unit() {
            return Err(InterpError::NotAUnitVector {
                length_sq: u.dot(u),
            });
        }
        let grid = self.model.grid();
        let level = grid.top_level(tess);
        let triangle = grid.locate(u, tess, level, self.hints[tess])?;
        self.hints[tess] = Some(triangle);

        let corners = grid.triangle(triangle);
        let bary = linear_coefficients(grid.triangle_vertices(triangle), u);
        if self.horizontal == HorizontalInterpolator::NaturalNeighbor {
            let near_vertex = bary.iter().any(|&c| c > 1.0 - 1e-12);
            let on_edge = bary.iter().any(|&c| c < 1e-12);
            if !near_vertex && !on_edge {
                match sibson_coefficients(grid, tess, triangle, u)? {
                    Some((vertices, coeffs)) => return Ok((triangle, vertices, coeffs)),
                    None => {
                        warn!(
                            "natural-neighbor construction degenerated at {}; using linear",
                            u
                        );
                    }
                }
            }
        }
        Ok((triangle, corners.to_vec(), bary.to_vec()))
    }

    /// Radial (node, weight) pairs at one vertex, with pinning into the
    /// layer's radius range.
    fn radial_coefficients(
        &mut self,
        vertex: u32,
        layer: usize,
        radius: f64,
        out_of_range: &mut bool,
    ) -> Vec<(usize, f64)> {
        let radii: Vec<f64> = match self.model.profile(vertex, layer) {
            Profile::Empty { .. } => return Vec::new(),
            Profile::Surface { .. } | Profile::Thin { .. } => return vec![(0, 1.0)],
            Profile::Constant {
                radius_bottom,
                radius_top,
                ..
            } => {
                if radius < f64::from(*radius_bottom) || radius > f64::from(*radius_top) {
                    *out_of_range = true;
                }
                return vec![(0, 1.0)];
            }
            Profile::NPoint { radii, .. } => radii.iter().map(|&r| f64::from(r)).collect(),
        };
        let bottom = radii[0];
        let top = radii[radii.len() - 1];
        let r = if radius < bottom {
            *out_of_range = true;
            bottom
        } else if radius > top {
            *out_of_range = true;
            top
        } else {
            radius
        };
        if self.radial_kind == RadialInterpolator::CubicSpline {
            let basis = self
                .splines
                .entry((vertex, layer))
                .or_insert_with(|| SplineBasis::new(&radii));
            if let Some(basis) = basis {
                return basis.coefficients(r).into_iter().enumerate().collect();
            }
        }
        linear_bracket(&radii, r)
    }

    /// Radial derivative weights contracted with the node values of one
    /// vertex. NaN for Empty profiles; 0 for variants with no radial
    /// extent.
    fn radial_derivative(&mut self, vertex: u32, layer: usize, radius: f64, attr: usize) -> f64 {
        let (radii, values): (Vec<f64>, Vec<f64>) = match self.model.profile(vertex, layer) {
            Profile::Empty { .. } => return f64::NAN,
            Profile::Surface { .. } | Profile::Thin { .. } | Profile::Constant { .. } => {
                return 0.0;
            }
            Profile::NPoint { radii, data } => (
                radii.iter().map(|&r| f64::from(r)).collect(),
                (0..radii.len()).map(|n| data.get(n, attr)).collect(),
            ),
        };
        let r = radius.clamp(radii[0], radii[radii.len() - 1]);
        if self.radial_kind == RadialInterpolator::CubicSpline {
            let basis = self
                .splines
                .entry((vertex, layer))
                .or_insert_with(|| SplineBasis::new(&radii));
            if let Some(basis) = basis {
                return basis
                    .derivative_coefficients(r)
                    .iter()
                    .zip(&values)
                    .map(|(w, y)| w * y)
                    .sum();
            }
        }
        // Linear: slope of the bracketing interval.
        let pairs = linear_bracket(&radii, r);
        if pairs.len() < 2 {
            return 0.0;
        }
        let (j, _) = pairs[0];
        let (k, _) = pairs[1];
        let h = radii[k] - radii[j];
        if h > 0.0 {
            (values[k] - values[j]) / h
        } else {
            0.0
        }
    }
}

/// Spherical barycentric coefficients of `u` in the triangle, normalized
/// to sum to 1. Exactly the unit basis at the triangle's own corners.
fn linear_coefficients([v0, v1, v2]: [Vec3; 3], u: Vec3) -> [f64; 3] {
    let c0 = u.triple(v1, v2);
    let c1 = u.triple(v2, v0);
    let c2 = u.triple(v0, v1);
    let sum = c0 + c1 + c2;
    [c0 / sum, c1 / sum, c2 / sum]
}

/// Linear radial weights on the interval bracketing `r`. A zero-width
/// bracket (repeated radius) puts all weight on the upper node.
fn linear_bracket(radii: &[f64], r: f64) -> Vec<(usize, f64)> {
    let n = radii.len();
    if n == 1 {
        return vec![(0, 1.0)];
    }
    let j = radii[1..n - 1].partition_point(|&x| x <= r);
    let h = radii[j + 1] - radii[j];
    if h > 0.0 {
        let b = (r - radii[j]) / h;
        vec![(j, 1.0 - b), (j + 1, b)]
    } else {
        vec![(j + 1, 1.0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolator_tags_parse() {
        assert_eq!(
            "linear".parse::<HorizontalInterpolator>().unwrap(),
            HorizontalInterpolator::Linear
        );
        assert_eq!(
            "NATURAL_NEIGHBOR".parse::<HorizontalInterpolator>().unwrap(),
            HorizontalInterpolator::NaturalNeighbor
        );
        assert_eq!(
            "cubic_spline".parse::<RadialInterpolator>().unwrap(),
            RadialInterpolator::CubicSpline
        );
        assert!("quintic".parse::<RadialInterpolator>().is_err());
    }

    #[test]
    fn barycentric_unit_basis_at_corners() {
        let v0 = Vec3::new(1.0, 0.0, 0.0);
        let v1 = Vec3::new(0.0, 1.0, 0.0);
        let v2 = Vec3::new(0.0, 0.0, 1.0);
        assert_eq!(linear_coefficients([v0, v1, v2], v0), [1.0, 0.0, 0.0]);
        assert_eq!(linear_coefficients([v0, v1, v2], v1), [0.0, 1.0, 0.0]);
        assert_eq!(linear_coefficients([v0, v1, v2], v2), [0.0, 0.0, 1.0]);
        let mid = v0.midpoint(v1).unwrap();
        let c = linear_coefficients([v0, v1, v2], mid);
        assert_relative_eq!(c[0], c[1], epsilon = 1e-15);
        assert_relative_eq!(c[2], 0.0, epsilon = 1e-15);
        assert_relative_eq!(c.iter().sum::<f64>(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn linear_bracket_weights_and_upper_tie() {
        let radii = [5000.0, 5500.0, 6000.0];
        assert_eq!(linear_bracket(&radii, 5250.0), vec![(0, 0.5), (1, 0.5)]);
        // At an interior knot the bracket starts there.
        assert_eq!(linear_bracket(&radii, 5500.0), vec![(1, 1.0), (2, 0.0)]);
        // Duplicate radius: weight lands on the upper node.
        let dup = [5000.0, 5500.0, 5500.0, 6000.0];
        let w = linear_bracket(&dup, 5500.0);
        assert_eq!(w, vec![(2, 1.0)]);
    }
}
