// Error handling for the sample rate converter

use thiserror::Error;

/// Converter error types
#[derive(Debug, Clone, Error)]
pub enum ResampleError {
    /// Bad ratio, zero block size or malformed spec
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failed
    #[error("Out of memory")]
    OutOfMemory,

    /// Storage backend or transform primitive failed
    #[error("External failure: {0}")]
    External(String),

    /// Iterative filter synthesis ran out of iterations
    #[error("Filter design did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    /// Invariant violation, always a bug
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResampleError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ResampleError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ResampleError::Internal(msg.into())
    }
}

/// Result type alias for converter operations
pub type Result<T> = std::result::Result<T, ResampleError>;

// Conversion implementations
impl From<std::io::Error> for ResampleError {
    fn from(err: std::io::Error) -> Self {
        ResampleError::External(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for ResampleError {
    fn from(_: std::collections::TryReserveError) -> Self {
        ResampleError::OutOfMemory
    }
}
