//! Error types for registration operations.
//!
//! This module provides structured error types for the phase model and the
//! registration loop.

use mmreg_core::CoreError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Volumes or phase table have inconsistent dimensions.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The 12×12 Gauss-Newton system could not be solved.
    #[error("Singular system at iteration {iteration}")]
    SingularSystem { iteration: usize },

    /// A Gaussian phase fit did not converge or is not positive definite.
    #[error("Degenerate fit: {0}")]
    DegenerateFit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error raised by the core data model.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a shape mismatch error from two volume shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create a degenerate fit error.
    pub fn degenerate_fit(msg: impl Into<String>) -> Self {
        Self::DegenerateFit(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
