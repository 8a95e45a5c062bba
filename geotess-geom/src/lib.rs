//! Spherical geometry primitives for triangulated earth models
//!
//! Leaf crate of the geotess workspace. Everything here is plain math on
//! unit vectors:
//! - [`vector::Vec3`]: dot/cross/triple products, rotations, spherical
//!   triangle predicates
//! - [`earth::EarthShape`]: lat/lon/radius conversions for the supported
//!   reference earths
//! - [`great_circle::GreatCircle`]: minor arcs and points along them
//! - [`polygon::SphericalPolygon`]: arc-crossing containment, used for
//!   active-region masks
//!
//! Angles are radians everywhere in this crate; degree conversions happen
//! at the callers' API boundary.

pub mod earth;
pub mod great_circle;
pub mod polygon;
pub mod vector;

pub use earth::{EarthShape, SPHERE_RADIUS_KM};
pub use great_circle::GreatCircle;
pub use polygon::SphericalPolygon;
pub use vector::Vec3;
