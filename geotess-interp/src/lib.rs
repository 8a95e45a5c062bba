//! Interpolation over triangulated earth models
//!
//! This crate turns a `geotess-model` [`Model`](geotess_model::Model)
//! into a queryable field:
//! - [`position::Position`]: a cursor that locates a (unit vector,
//!   radius, layer) target and exposes values, coefficients, and radial
//!   gradients
//! - horizontal interpolation: spherical barycentric (linear) or
//!   natural-neighbor (Sibson) coefficients over the grid vertices
//! - radial interpolation: linear bracketing or a natural cubic-spline
//!   basis over each profile's radii
//! - [`weights::path_weights`]: trapezoidal accumulation of point
//!   weights along piecewise great-circle paths
//!
//! Angles are radians and radii km throughout; degree conversions live
//! at the geographic ingress helpers.

pub mod error;
pub mod natural_neighbor;
pub mod position;
pub mod spline;
pub mod weights;

pub use error::{InterpError, InterpResult};
pub use position::{HorizontalInterpolator, Position, RadialInterpolator};
pub use weights::{path_weights, total_weight};

#[cfg(test)]
mod tests {
    use super::position::{HorizontalInterpolator, Position, RadialInterpolator};
    use approx::assert_relative_eq;
    use geotess_geom::{EarthShape, Vec3};
    use geotess_model::data::DataColumn;
    use geotess_model::profile::Profile;
    use geotess_model::{DataType, Grid, MetaData, Model, OUTSIDE_POINT};
    use std::sync::Arc;

    fn ll(lat: f64, lon: f64) -> Vec3 {
        EarthShape::Sphere.unit_vector_degrees(lat, lon)
    }

    /// 2D model storing, at every vertex, the angular distance in
    /// degrees to a fixed anchor point.
    fn distance_field_model(grid: Arc<Grid>, anchor: Vec3) -> Model {
        let meta = MetaData::single_tessellation(
            vec!["surface".into()],
            vec!["distance".into()],
            vec!["degrees".into()],
            DataType::Float,
            EarthShape::Sphere,
        )
        .unwrap();
        let mut model = Model::new(grid.clone(), meta).unwrap();
        for v in 0..grid.nvertices() as u32 {
            let d = grid.vertex(v).angle(anchor).to_degrees() as f32;
            model
                .set_profile(
                    v,
                    0,
                    Profile::Surface {
                        data: DataColumn::floats(vec![d]),
                    },
                )
                .unwrap();
        }
        model
    }

    /// Two-layer model with the boundary at 6000 km; attribute 0 is the
    /// layer index so boundary assignment is visible in values.
    fn two_layer_model(grid: Arc<Grid>) -> Model {
        let meta = MetaData::single_tessellation(
            vec!["lower".into(), "upper".into()],
            vec!["which".into()],
            vec!["".into()],
            DataType::Float,
            EarthShape::Sphere,
        )
        .unwrap();
        let mut model = Model::new(grid.clone(), meta).unwrap();
        for v in 0..grid.nvertices() as u32 {
            let mut lower = DataColumn::new(DataType::Float, 3, 1).unwrap();
            for n in 0..3 {
                lower.set(n, 0, 0.0).unwrap();
            }
            model
                .set_profile(
                    v,
                    0,
                    Profile::npoint(vec![5000.0, 5500.0, 6000.0], lower).unwrap(),
                )
                .unwrap();
            let mut upper = DataColumn::new(DataType::Float, 3, 1).unwrap();
            for n in 0..3 {
                upper.set(n, 0, 1.0).unwrap();
            }
            model
                .set_profile(
                    v,
                    1,
                    Profile::npoint(vec![6000.0, 6200.0, 6371.0], upper).unwrap(),
                )
                .unwrap();
        }
        model
    }

    #[test]
    fn interpolated_distance_field_matches_geometry() {
        let grid = Arc::new(Grid::icosahedron(3).unwrap());
        let anchor = ll(34.9462, -106.4567);
        let model = distance_field_model(grid, anchor);
        let query = ll(3.316, 95.854);
        let expected = query.angle(anchor).to_degrees();
        for horizontal in [
            HorizontalInterpolator::Linear,
            HorizontalInterpolator::NaturalNeighbor,
        ] {
            let mut pos = Position::new(&model, horizontal, RadialInterpolator::Linear);
            pos.set(0, query, 6371.0).unwrap();
            let value = pos.get_value(0).unwrap();
            // The field is smooth, so coarse linear interpolation lands
            // within a fraction of a degree.
            assert_relative_eq!(value, expected, epsilon = 0.5);
        }
    }

    #[test]
    fn horizontal_coefficients_always_sum_to_one() {
        let grid = Arc::new(Grid::icosahedron(3).unwrap());
        let model = distance_field_model(grid, ll(10.0, 20.0));
        for horizontal in [
            HorizontalInterpolator::Linear,
            HorizontalInterpolator::NaturalNeighbor,
        ] {
            let mut pos = Position::new(&model, horizontal, RadialInterpolator::Linear);
            for (lat, lon) in [
                (0.0, 0.0),
                (13.5, -77.25),
                (-42.0, 171.0),
                (89.0, 5.0),
                (-63.43, 58.28),
            ] {
                pos.set(0, ll(lat, lon), 6371.0).unwrap();
                let sum: f64 = pos.get_horizontal_coefficients().unwrap().iter().sum();
                assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
                for radial in pos.get_radial_coefficients().unwrap() {
                    let rsum: f64 = radial.iter().map(|&(_, w)| w).sum();
                    assert_relative_eq!(rsum, 1.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn query_at_a_grid_vertex_yields_one_coefficient() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid.clone());
        let v = 7u32;
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        // Radius exactly at a profile node, horizontal exactly at the
        // vertex: one point id, weight 1.
        pos.set(0, grid.vertex(v), 5500.0).unwrap();
        let coeffs = pos.get_coefficients().unwrap();
        assert_eq!(coeffs.len(), 1);
        let (&p, &w) = coeffs.iter().next().unwrap();
        assert_relative_eq!(w, 1.0, epsilon = 1e-12);
        assert_eq!(model.point_map().point_to_triple(p), Some((v, 0, 1)));
        // The same holds under natural-neighbor, which detects the
        // vertex hit and degrades to the exact basis.
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::NaturalNeighbor,
            RadialInterpolator::Linear,
        );
        pos.set(0, grid.vertex(v), 5500.0).unwrap();
        let coeffs = pos.get_coefficients().unwrap();
        assert_eq!(coeffs.len(), 1);
    }

    #[test]
    fn edge_queries_use_the_two_edge_vertices() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid.clone());
        let t = grid.level_first_triangle(0, 1);
        let [a, b, _] = grid.triangle(t);
        let mid = grid.vertex(a).midpoint(grid.vertex(b)).unwrap();
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        pos.set(0, mid, 5500.0).unwrap();
        let hc = pos.get_horizontal_coefficients().unwrap();
        let verts = pos.get_vertices().unwrap();
        let mut nonzero: Vec<(u32, f64)> = verts
            .iter()
            .zip(hc)
            .filter(|(_, &w)| w > 1e-12)
            .map(|(&v, &w)| (v, w))
            .collect();
        nonzero.sort_by_key(|&(v, _)| v);
        assert_eq!(nonzero.len(), 2);
        let wsum: f64 = nonzero.iter().map(|&(_, w)| w).sum();
        assert_relative_eq!(wsum, 1.0, epsilon = 1e-12);
        assert!(nonzero.iter().any(|&(v, _)| v == a));
        assert!(nonzero.iter().any(|&(v, _)| v == b));
    }

    #[test]
    fn out_of_layer_radius_pins_and_flags() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid);
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        let u = ll(15.0, 30.0);
        // 7000 km is above the top of layer 1.
        pos.set(1, u, 7000.0).unwrap();
        assert!(pos.radius_out_of_range().unwrap());
        let pinned = pos.get_coefficients().unwrap();
        // All weight on top nodes (node 2 of layer 1 profiles).
        for (&p, _) in &pinned {
            let (_, layer, node) = pos.model().point_map().point_to_triple(p).unwrap();
            assert_eq!((layer, node), (1, 2));
        }
        // Below the bottom of layer 0.
        pos.set(0, u, 1000.0).unwrap();
        assert!(pos.radius_out_of_range().unwrap());
        // In range resets the flag.
        pos.set(0, u, 5600.0).unwrap();
        assert!(!pos.radius_out_of_range().unwrap());
    }

    #[test]
    fn shared_boundary_radius_belongs_to_the_upper_layer() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid);
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        pos.set_at_radius(ll(25.0, -40.0), 6000.0).unwrap();
        assert_eq!(pos.layer().unwrap(), 1);
        assert_relative_eq!(pos.get_value(0).unwrap(), 1.0, epsilon = 1e-12);
        // Just below the boundary: lower layer.
        pos.set_at_radius(ll(25.0, -40.0), 5999.0).unwrap();
        assert_eq!(pos.layer().unwrap(), 0);
        assert_relative_eq!(pos.get_value(0).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn set_top_and_set_bottom_land_on_layer_boundaries() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid);
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        let u = ll(-10.0, 120.0);
        pos.set_top(1, u).unwrap();
        assert_relative_eq!(pos.radius().unwrap(), 6371.0, epsilon = 1e-9);
        pos.set_bottom(1, u).unwrap();
        assert_relative_eq!(pos.radius().unwrap(), 6000.0, epsilon = 1e-9);
        assert!(!pos.radius_out_of_range().unwrap());
    }

    #[test]
    fn failed_set_keeps_the_previous_state() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid);
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        pos.set(0, ll(5.0, 5.0), 5500.0).unwrap();
        let before = pos.get_triangle().unwrap();
        // Bad layer, then bad vector: both leave the state alone.
        assert!(pos.set(9, ll(6.0, 6.0), 5500.0).is_err());
        assert!(pos.set(0, Vec3::new(2.0, 0.0, 0.0), 5500.0).is_err());
        assert_eq!(pos.get_triangle().unwrap(), before);
        assert_eq!(pos.layer().unwrap(), 0);
    }

    #[test]
    fn retargeting_to_a_sibling_model_preserves_coefficients() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let m1 = distance_field_model(grid.clone(), ll(0.0, 0.0));
        let m2 = distance_field_model(grid.clone(), ll(45.0, 45.0));
        let query = ll(30.0, -60.0);

        let mut pos = Position::new(
            &m1,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        pos.set(0, query, 6371.0).unwrap();
        let h1: Vec<f64> = pos.get_horizontal_coefficients().unwrap().to_vec();
        let retargeted = pos.set_model(&m2).unwrap();

        let mut fresh = Position::new(
            &m2,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        fresh.set(0, query, 6371.0).unwrap();

        assert_eq!(
            retargeted.get_horizontal_coefficients().unwrap(),
            fresh.get_horizontal_coefficients().unwrap()
        );
        assert_eq!(retargeted.get_horizontal_coefficients().unwrap(), &h1[..]);
        assert_eq!(
            retargeted.get_value(0).unwrap(),
            fresh.get_value(0).unwrap()
        );

        // A model on a different grid is refused.
        let other = distance_field_model(
            Arc::new(Grid::icosahedron(1).unwrap()),
            ll(0.0, 0.0),
        );
        assert!(matches!(
            fresh.set_model(&other),
            Err(super::InterpError::GridMismatch { .. })
        ));
    }

    #[test]
    fn empty_profiles_interpolate_nan_and_route_weight_outside() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let mut model = two_layer_model(grid.clone());
        // Hollow out layer 0 at one vertex and query next to it.
        let t = grid.level_first_triangle(0, 1);
        let [a, b, c] = grid.triangle(t);
        model
            .set_profile(a, 0, Profile::empty(5000.0, 6000.0).unwrap())
            .unwrap();
        let u = (grid.vertex(a) + grid.vertex(b) + grid.vertex(c))
            .normalized()
            .unwrap();
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        pos.set(0, u, 5500.0).unwrap();
        assert!(pos.get_value(0).unwrap().is_nan());
        let coeffs = pos.get_coefficients().unwrap();
        let outside = coeffs.get(&OUTSIDE_POINT).copied().unwrap_or(0.0);
        assert!(outside > 0.0);
        let total: f64 = coeffs.values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_spline_values_match_linear_at_nodes_and_stay_smooth() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid.clone());
        let v = 3u32;
        let u = grid.vertex(v);
        let mut lin = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        let mut spl = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::CubicSpline,
        );
        for r in [5000.0, 5500.0, 6000.0] {
            lin.set(0, u, r).unwrap();
            spl.set(0, u, r).unwrap();
            assert_relative_eq!(
                lin.get_value(0).unwrap(),
                spl.get_value(0).unwrap(),
                epsilon = 1e-9
            );
        }
        // Between nodes the spline weights still sum to 1.
        spl.set(0, u, 5750.0).unwrap();
        let radial = spl.get_radial_coefficients().unwrap();
        for nodes in radial {
            if nodes.is_empty() {
                continue;
            }
            let s: f64 = nodes.iter().map(|&(_, w)| w).sum();
            assert_relative_eq!(s, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn geographic_ingress_round_trips_through_depth() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let model = two_layer_model(grid);
        let mut pos = Position::new(
            &model,
            HorizontalInterpolator::Linear,
            RadialInterpolator::Linear,
        );
        pos.set_geographic(1, 30.0, 90.0, 100.0).unwrap();
        assert_relative_eq!(pos.depth().unwrap(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(pos.latitude_degrees().unwrap(), 30.0, epsilon = 1e-9);
        assert_relative_eq!(pos.longitude_degrees().unwrap(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn radial_gradient_matches_the_profile_slope() {
        let grid = Arc::new(Grid::icosahedron(2).unwrap());
        let meta = MetaData::single_tessellation(
            vec!["mantle".into()],
            vec!["vp".into()],
            vec!["km/s".into()],
            DataType::Double,
            EarthShape::Sphere,
        )
        .unwrap();
        let mut model = Model::new(grid.clone(), meta).unwrap();
        // vp = 0.002 * r at every vertex: gradient is exactly 0.002.
        let radii = vec![5000.0f32, 5400.0, 5900.0, 6371.0];
        for v in 0..grid.nvertices() as u32 {
            let mut col = DataColumn::new(DataType::Double, 4, 1).unwrap();
            for (n, &r) in radii.iter().enumerate() {
                col.set(n, 0, 0.002 * r as f64).unwrap();
            }
            model
                .set_profile(v, 0, Profile::npoint(radii.clone(), col).unwrap())
                .unwrap();
        }
        for radial in [RadialInterpolator::Linear, RadialInterpolator::CubicSpline] {
            let mut pos = Position::new(&model, HorizontalInterpolator::Linear, radial);
            pos.set(0, ll(12.0, 34.0), 5650.0).unwrap();
            assert_relative_eq!(
                pos.get_radial_gradient(0).unwrap(),
                0.002,
                epsilon = 1e-9
            );
        }
    }
}
