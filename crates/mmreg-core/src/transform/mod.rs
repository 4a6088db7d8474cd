//! Transform types and operations.
//!
//! This module provides the homogeneous transform Phi together with its
//! translation / rotation / zoom parameterisation.

pub mod trait_;
pub mod phi;
pub mod parameters;

pub use trait_::Transform;
pub use phi::Phi;
pub use parameters::{compose, decompose, Decomposition, TransformParameters, MIN_SINGULAR_VALUE};
