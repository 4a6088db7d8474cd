//! Interpolation types and operations.
//!
//! This module provides interpolation traits and implementations
//! for sampling volumes at continuous voxel coordinates.

pub mod linear;
pub mod trait_;

pub use linear::LinearInterpolator;
pub use trait_::Interpolator;
