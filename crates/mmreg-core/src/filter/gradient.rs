//! Spatial gradient of a volume.
//!
//! Central differences in the interior and one-sided differences on the
//! faces, with unit voxel spacing. Axes of extent one have zero gradient.

use rayon::prelude::*;
use crate::volume::Volume;

/// Gradient components along `z`, `y` and `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub z: Volume<f64>,
    pub y: Volume<f64>,
    pub x: Volume<f64>,
}

impl Gradient {
    /// `(gz, gy, gx)` at a voxel.
    #[inline]
    pub fn at(&self, z: usize, y: usize, x: usize) -> [f64; 3] {
        let i = self.z.index(z, y, x);
        [self.z.as_slice()[i], self.y.as_slice()[i], self.x.as_slice()[i]]
    }
}

/// Difference along one axis at position `i` of `n`, given a sampler.
#[inline]
fn diff(i: usize, n: usize, f: impl Fn(usize) -> f64) -> f64 {
    if n < 2 {
        0.0
    } else if i == 0 {
        f(1) - f(0)
    } else if i == n - 1 {
        f(n - 1) - f(n - 2)
    } else {
        (f(i + 1) - f(i - 1)) * 0.5
    }
}

fn axis_gradient(volume: &Volume<f64>, axis: usize) -> Volume<f64> {
    let shape = volume.shape();
    let [nz, ny, nx] = shape;
    let mut out = Volume::zeros(shape);
    if ny * nx == 0 {
        return out;
    }
    out.as_mut_slice()
        .par_chunks_mut(ny * nx)
        .enumerate()
        .for_each(|(z, slice)| {
            for y in 0..ny {
                for x in 0..nx {
                    slice[y * nx + x] = match axis {
                        0 => diff(z, nz, |k| volume.get(k, y, x)),
                        1 => diff(y, ny, |k| volume.get(z, k, x)),
                        _ => diff(x, nx, |k| volume.get(z, y, k)),
                    };
                }
            }
        });
    out
}

/// Gradient of `volume` along its three axes.
pub fn gradient(volume: &Volume<f64>) -> Gradient {
    Gradient {
        z: axis_gradient(volume, 0),
        y: axis_gradient(volume, 1),
        x: axis_gradient(volume, 2),
    }
}
