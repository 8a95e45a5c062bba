//! Multi-resolution triangulated earth models
//!
//! Core crate of the geotess workspace. It stores multi-dimensional
//! earth models on hierarchical triangular tessellations of the unit
//! sphere and serializes them to the GEOTESSGRID / GEOTESSMODEL file
//! formats (binary and ASCII).
//!
//! The pieces, in dependency order:
//! - [`grid::Grid`]: vertex and triangle tables, nested tessellation
//!   levels, lazy adjacency caches, walking-triangle point location
//! - [`data`]: the model-wide element kind and columnar attribute
//!   storage
//! - [`profile::Profile`]: the five radial profile variants at each
//!   (vertex, layer)
//! - [`metadata::MetaData`]: layer and attribute schema, earth shape,
//!   provenance
//! - [`pointmap::PointMap`]: dense enumeration of every real data node
//! - [`model::Model`]: the container tying them together
//! - [`io`]: stream primitives and the derived-class extension hook
//!
//! Interpolation lives in the `geotess-interp` crate, which queries
//! models through the public surface exposed here.

pub mod data;
pub mod error;
pub mod grid;
pub mod io;
pub mod metadata;
pub mod model;
pub mod pointmap;
pub mod profile;

pub use data::{DataColumn, DataType, DataValues};
pub use error::{GeoTessError, GeoTessErrorKind, Result};
pub use grid::{Grid, LevelSpan};
pub use io::extension::{CustomCellCodec, ExtensionFactory, ExtensionRegistry, ModelExtension};
pub use metadata::MetaData;
pub use model::Model;
pub use pointmap::{PointMap, OUTSIDE_POINT};
pub use profile::{Profile, ProfileType};

// Re-export the geometry leaf so downstream crates name one dependency.
pub use geotess_geom as geom;
