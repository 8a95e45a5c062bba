use thiserror::Error;

/// Specific kinds of model errors
#[derive(Debug, Error)]
pub enum GeoTessErrorKind {
    #[error("io error while reading")]
    Io(
        #[from]
        #[source]
        std::io::Error,
    ),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(
        #[from]
        #[source]
        std::str::Utf8Error,
    ),

    /// Caller-supplied value out of range: lat/lon/radius, layer or
    /// attribute index, interpolator tag, negative count.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Magic mismatch, unsupported version, truncated payload, grid-id
    /// mismatch, unknown data-type tag.
    #[error("malformed file: {0}")]
    MalformedFile(String),

    /// Structurally invalid model: undefined tessellation reference,
    /// non-monotonic profile radii, profile outside its layer.
    #[error("inconsistent model: {0}")]
    Inconsistent(String),

    /// Colinear triangle vertices during circumcenter computation. Never
    /// happens on a well-formed grid.
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),
}

/// Model error with byte offset context
///
/// The offset is the stream position at which the error was detected; it
/// is zero for errors that do not come from a file.
#[derive(Debug, Error)]
#[error("{kind} at byte offset {offset}")]
pub struct GeoTessError {
    pub kind: GeoTessErrorKind,
    pub offset: usize,
}

impl GeoTessError {
    /// Create a new error with the given kind and byte offset
    pub fn at(kind: GeoTessErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    /// Create an error that did not originate from a stream
    pub fn new(kind: GeoTessErrorKind) -> Self {
        Self { kind, offset: 0 }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(GeoTessErrorKind::InvalidInput(msg.into()))
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::new(GeoTessErrorKind::Inconsistent(msg.into()))
    }
}

impl From<std::io::Error> for GeoTessError {
    fn from(e: std::io::Error) -> Self {
        Self::new(GeoTessErrorKind::Io(e))
    }
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, GeoTessError>;
