//! Error types for volume and transform operations.

use thiserror::Error;

/// Errors raised by the core data model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Buffer length does not match the requested shape.
    #[error("Data length {actual} does not match shape {shape:?} ({expected} voxels)")]
    DataLength {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    /// Two volumes that must be co-located have different shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// The bottom row of a homogeneous matrix is not `[0, 0, 0, 1]`.
    #[error("Not a homogeneous transform: bottom row is {0:?}")]
    NotHomogeneous([f64; 4]),

    /// The linear block cannot be inverted.
    #[error("Singular transform: {0}")]
    SingularTransform(String),

    /// The linear block has a negative determinant.
    #[error("Transform contains a reflection (det = {determinant:.6e})")]
    Reflection { determinant: f64 },

    /// The linear block has a vanishing singular value.
    #[error("Degenerate scale: smallest singular value {singular_value:.3e}")]
    DegenerateScale { singular_value: f64 },

    /// Grey limits that cannot define a rescaling.
    #[error("Invalid intensity range: {0}")]
    InvalidIntensityRange(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a singular transform error.
    pub fn singular(msg: impl Into<String>) -> Self {
        Self::SingularTransform(msg.into())
    }

    /// Create an invalid intensity range error.
    pub fn intensity_range(msg: impl Into<String>) -> Self {
        Self::InvalidIntensityRange(msg.into())
    }
}
