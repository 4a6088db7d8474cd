//! Transform trait for voxel coordinate mappings.
//!
//! This module defines the Transform trait used by the resampling filter.

/// Maps centred voxel coordinates `(z, y, x)` of one grid to another.
///
/// Coordinates are relative to the grid centre `(shape - 1) / 2`, the
/// convention shared by every transform in this crate.
pub trait Transform {
    /// Apply the transform to a single point.
    fn transform_point(&self, point: [f64; 3]) -> [f64; 3];
}
