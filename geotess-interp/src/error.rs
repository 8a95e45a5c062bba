//! Error types for interpolation queries

use std::fmt;

use geotess_model::GeoTessError;

/// Result type for interpolation operations
pub type InterpResult<T> = Result<T, InterpError>;

/// Errors that can occur while positioning or interpolating
#[derive(Debug)]
pub enum InterpError {
    /// Layer index beyond the model's layer stack
    LayerOutOfRange {
        /// Requested layer
        layer: usize,
        /// Layers the model defines
        nlayers: usize,
    },

    /// Horizontal target is not a unit vector
    NotAUnitVector {
        /// The offending vector's squared length
        length_sq: f64,
    },

    /// Position queried before any successful `set`
    NotPositioned,

    /// Retarget to a model on a different grid
    GridMismatch {
        /// Grid id of the current model
        current: String,
        /// Grid id of the requested model
        requested: String,
    },

    /// Mismatched point/radius sequences handed to path integration
    PathShapeMismatch {
        /// Number of path points
        npoints: usize,
        /// Number of radii
        nradii: usize,
    },

    /// Integration step must be positive and finite
    BadIntegrationStep {
        /// The step that was supplied
        step: f64,
    },

    /// Consecutive path points are antipodal, so no unique great circle
    /// joins them
    DegeneratePathSegment {
        /// Index of the first point of the offending pair
        index: usize,
    },

    /// Failure raised by the underlying model or grid
    Model(GeoTessError),
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::LayerOutOfRange { layer, nlayers } => {
                write!(f, "layer {} out of range, model has {} layers", layer, nlayers)
            }
            InterpError::NotAUnitVector { length_sq } => {
                write!(
                    f,
                    "horizontal target is not a unit vector (|v|^2 = {})",
                    length_sq
                )
            }
            InterpError::NotPositioned => {
                write!(f, "position queried before a successful set")
            }
            InterpError::GridMismatch { current, requested } => {
                write!(
                    f,
                    "cannot retarget position from grid {} to grid {}",
                    current, requested
                )
            }
            InterpError::PathShapeMismatch { npoints, nradii } => {
                write!(
                    f,
                    "path has {} points but {} radii",
                    npoints, nradii
                )
            }
            InterpError::BadIntegrationStep { step } => {
                write!(f, "integration step {} must be positive and finite", step)
            }
            InterpError::DegeneratePathSegment { index } => {
                write!(
                    f,
                    "path points {} and {} are antipodal, the great circle between them is not unique",
                    index,
                    index + 1
                )
            }
            InterpError::Model(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InterpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterpError::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GeoTessError> for InterpError {
    fn from(e: GeoTessError) -> Self {
        InterpError::Model(e)
    }
}
