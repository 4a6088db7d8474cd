//! Core data model for multimodal volume registration.
//!
//! Volumes, grey-level bucketing, trilinear interpolation, resampling,
//! spatial gradients and the homogeneous transform Phi.

pub mod error;
pub mod filter;
pub mod interpolation;
pub mod transform;
pub mod volume;

pub use error::{CoreError, Result};
pub use filter::{apply_phi, gradient, sample_under};
pub use transform::{Phi, Transform, TransformParameters};
pub use volume::{IntensityScale, Volume};
