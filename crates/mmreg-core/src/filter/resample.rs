//! Resample volume filter.
//!
//! This module provides ResampleFilter which resamples a volume
//! onto a grid using a transform and an interpolator.

use rayon::prelude::*;
use crate::error::Result;
use crate::interpolation::{Interpolator, LinearInterpolator};
use crate::transform::{Phi, Transform};
use crate::volume::{centre_of, Volume};

/// Resample volume filter.
///
/// For every output voxel `p`, the transform maps the centred output
/// coordinate to a centred input coordinate, and the interpolator samples
/// the input there:
///
/// `out(p) = input(c_in + T(p - c_out))`
///
/// The transform therefore maps Output Space -> Input Space, the inverse of
/// the transform that carries the input onto the output.
pub struct ResampleFilter<T, I>
where
    T: Transform + Sync,
    I: Interpolator,
{
    shape: [usize; 3],
    transform: T,
    interpolator: I,
}

impl<T, I> ResampleFilter<T, I>
where
    T: Transform + Sync,
    I: Interpolator,
{
    /// Create a new resample filter producing volumes of `shape`.
    pub fn new(shape: [usize; 3], transform: T, interpolator: I) -> Self {
        Self {
            shape,
            transform,
            interpolator,
        }
    }

    /// Output shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Apply filter to an input volume.
    pub fn apply(&self, input: &Volume<f64>) -> Volume<f64> {
        let [_, ny, nx] = self.shape;
        let c_out = centre_of(self.shape);
        let c_in = input.centre();
        let mut out = Volume::filled(self.shape, f64::NAN);
        tracing::debug!(
            input = ?input.shape(),
            output = ?self.shape,
            "resampling volume"
        );
        if ny * nx == 0 {
            return out;
        }

        out.as_mut_slice()
            .par_chunks_mut(ny * nx)
            .enumerate()
            .for_each(|(z, slice)| {
                for y in 0..ny {
                    for x in 0..nx {
                        let p = [
                            z as f64 - c_out[0],
                            y as f64 - c_out[1],
                            x as f64 - c_out[2],
                        ];
                        let q = self.transform.transform_point(p);
                        let src = [q[0] + c_in[0], q[1] + c_in[1], q[2] + c_in[2]];
                        slice[y * nx + x] = self.interpolator.interpolate(input, src);
                    }
                }
            });
        out
    }
}

/// Deform `volume` by `phi`: `out(x) = volume(phi⁻¹ · x)`.
///
/// Fails when `phi` is not invertible.
pub fn apply_phi(volume: &Volume<f64>, phi: &Phi) -> Result<Volume<f64>> {
    let inverse = phi.inverse()?;
    Ok(ResampleFilter::new(volume.shape(), inverse, LinearInterpolator::new()).apply(volume))
}

/// Sample `volume` at the points `phi · x`: `out(x) = volume(phi · x)`.
///
/// This is `apply_phi(volume, phi⁻¹)` without forming the inverse.
pub fn sample_under(volume: &Volume<f64>, phi: &Phi) -> Volume<f64> {
    ResampleFilter::new(volume.shape(), *phi, LinearInterpolator::new()).apply(volume)
}
