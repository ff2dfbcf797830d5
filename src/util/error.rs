//! Error types for the fibre library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fibre operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Scalar-property schema of an element differs from its set
    #[error("Schema mismatch: element has [{elem}], set has [{set}]")]
    SchemaMismatch { elem: String, set: String },

    /// Element degree differs from the fixed degree of a set
    #[error("Degree mismatch: element degree {elem} does not match set degree {set} (call free_elem_degree() if this is intentional)")]
    DegreeMismatch { elem: usize, set: usize },

    /// Element or slot index out of bounds
    #[error("Index {index} out of range (size: {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Structural mutation attempted through a non-owning view
    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),

    /// Property key not present
    #[error("Property not found: {0}")]
    KeyNotFound(String),

    /// A sidecar properties row does not cover the declared keys
    #[error("Property row mismatch: missing value for '{0}'")]
    PropertyRowMismatch(String),

    /// Malformed file content (bad preamble, token or framing)
    #[error("Invalid file format: {0}")]
    FileFormat(String),

    /// Primary stream and properties sidecar are out of step
    #[error("Desynchronized sidecar: {0}")]
    Desync(String),

    /// Violated precondition (e.g. matching size requirement)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a file format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::FileFormat(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an out-of-range error.
    pub fn out_of_range(index: usize, size: usize) -> Self {
        Self::IndexOutOfRange { index, size }
    }
}

/// Result type alias for fibre operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::IndexOutOfRange { index: 5, size: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));

        let e = Error::KeyNotFound("acs".to_string());
        assert!(e.to_string().contains("acs"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
