//! Interpolator trait for sampling values at continuous coordinates.
//!
//! This module defines the core Interpolator trait that all interpolation methods must implement.

use crate::volume::Volume;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// Coordinates are voxel indices `(z, y, x)` in the sampled volume, not
/// centred. Points outside the volume sample as `NaN`, which every consumer
/// treats as an invalid voxel.
pub trait Interpolator: Sync {
    /// Sample `volume` at `point`.
    fn interpolate(&self, volume: &Volume<f64>, point: [f64; 3]) -> f64;
}
