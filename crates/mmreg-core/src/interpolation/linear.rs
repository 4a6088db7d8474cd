//! Linear interpolation implementation.
//!
//! This module provides trilinear (order-1) interpolation for 3D volumes.

use serde::{Deserialize, Serialize};
use crate::volume::Volume;
use super::trait_::Interpolator;

/// Linear Interpolator.
///
/// Performs trilinear interpolation between the eight voxels surrounding a
/// point. Points outside `[0, n - 1]` on any axis yield `NaN`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

/// Lower corner, upper corner and weight of the upper corner along one axis.
#[inline]
fn axis_weights(c: f64, n: usize) -> Option<(usize, usize, f64)> {
    if n == 0 {
        return None;
    }
    let last = (n - 1) as f64;
    // NaN fails both comparisons
    if !(c >= 0.0 && c <= last) {
        return None;
    }
    let i0 = (c.floor() as usize).min(n.saturating_sub(2));
    let i1 = (i0 + 1).min(n - 1);
    Some((i0, i1, c - i0 as f64))
}

impl Interpolator for LinearInterpolator {
    fn interpolate(&self, volume: &Volume<f64>, point: [f64; 3]) -> f64 {
        let [nz, ny, nx] = volume.shape();
        let (z0, z1, wz) = match axis_weights(point[0], nz) {
            Some(a) => a,
            None => return f64::NAN,
        };
        let (y0, y1, wy) = match axis_weights(point[1], ny) {
            Some(a) => a,
            None => return f64::NAN,
        };
        let (x0, x1, wx) = match axis_weights(point[2], nx) {
            Some(a) => a,
            None => return f64::NAN,
        };

        let v = |z, y, x| volume.get(z, y, x);

        // Interpolate along X
        let c00 = v(z0, y0, x0) * (1.0 - wx) + v(z0, y0, x1) * wx;
        let c01 = v(z0, y1, x0) * (1.0 - wx) + v(z0, y1, x1) * wx;
        let c10 = v(z1, y0, x0) * (1.0 - wx) + v(z1, y0, x1) * wx;
        let c11 = v(z1, y1, x0) * (1.0 - wx) + v(z1, y1, x1) * wx;

        // Interpolate along Y
        let c0 = c00 * (1.0 - wy) + c01 * wy;
        let c1 = c10 * (1.0 - wy) + c11 * wy;

        // Interpolate along Z
        c0 * (1.0 - wz) + c1 * wz
    }
}
