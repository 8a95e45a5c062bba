//! Path-weight accumulation
//!
//! Given a piecewise great-circle path through (unit vector, radius)
//! pairs, accumulate a weight per model point such that, for any
//! attribute, the weighted sum of point values equals the line integral
//! of the interpolated field along the path. The sum of all weights is
//! the path length in km.
//!
//! Between consecutive inputs both the direction (along the great
//! circle) and the radius (linearly in arc length) are interpolated;
//! each segment is cut into `ceil(arc / step)` sub-intervals and the
//! trapezoidal rule spreads each sub-interval's length (arc times
//! midpoint radius) over the coefficient sets of its two endpoints.
//!
//! The first error aborts the accumulation and the partial map is
//! discarded.

use std::collections::HashMap;

use geotess_geom::{GreatCircle, Vec3};

use crate::error::{InterpError, InterpResult};
use crate::position::Position;

/// Arcs shorter than this contribute no length and are skipped; repeated
/// path points are legal input.
const MIN_ARC: f64 = 1e-13;

/// Accumulated point weights along a path. Keys are point ids of the
/// position's model ([`geotess_model::OUTSIDE_POINT`] collects weight
/// falling outside the active region or on Empty profiles); values are
/// km.
pub fn path_weights(
    position: &mut Position,
    points: &[Vec3],
    radii: &[f64],
    step_radians: f64,
) -> InterpResult<HashMap<i32, f64>> {
    if points.len() != radii.len() {
        return Err(InterpError::PathShapeMismatch {
            npoints: points.len(),
            nradii: radii.len(),
        });
    }
    if !(step_radians > 0.0 && step_radians.is_finite()) {
        return Err(InterpError::BadIntegrationStep { step: step_radians });
    }
    let mut weights = HashMap::new();
    for i in 0..points.len().saturating_sub(1) {
        let (a, b) = (points[i], points[i + 1]);
        let arc = a.angle(b);
        if arc < MIN_ARC {
            continue;
        }
        let gc = GreatCircle::new(a, b)
            .ok_or(InterpError::DegeneratePathSegment { index: i })?;
        let n = (arc / step_radians).ceil() as usize;
        let dr = (radii[i + 1] - radii[i]) / n as f64;
        let da = arc / n as f64;
        // Trapezoidal spread: sub-point k carries half of each adjacent
        // sub-interval's length.
        for k in 0..=n {
            let u = gc.point_at(da * k as f64);
            let r = radii[i] + dr * k as f64;
            let mut contribution = 0.0;
            if k > 0 {
                let mid = radii[i] + dr * (k as f64 - 0.5);
                contribution += 0.5 * da * mid;
            }
            if k < n {
                let mid = radii[i] + dr * (k as f64 + 0.5);
                contribution += 0.5 * da * mid;
            }
            position.set_at_radius(u, r)?;
            position.accumulate_coefficients(&mut weights, contribution)?;
        }
    }
    Ok(weights)
}

/// Path length in km implied by a weight map: the sum of all weights.
pub fn total_weight(weights: &HashMap<i32, f64>) -> f64 {
    weights.values().sum()
}
