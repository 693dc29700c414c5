//! Error types for the apex-vio library
//!
//! All errors use the `thiserror` crate for automatic trait implementations.

use thiserror::Error;

/// Main result type used throughout the apex-vio library
pub type ApexVioResult<T> = Result<T, ApexVioError>;

/// Main error type for the apex-vio library
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApexVioError {
    /// Invalid input parameters (block sizes, rays, non-finite values)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Landmark depth collapsed to zero while the factor rejects degenerate depth
    #[error("Degenerate depth: {0}")]
    DegenerateDepth(String),

    /// Invalid mount calibration (rotation axis, lever arm)
    #[error("Calibration error: {0}")]
    Calibration(String),
}
