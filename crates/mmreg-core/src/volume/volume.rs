//! Dense 3D volume stored in row-major `(z, y, x)` order.

use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};

/// A dense 3D array of samples.
///
/// Samples are laid out in C order: `index = (z * ny + y) * nx + x`,
/// matching the `(z, y, x)` axis convention used by every transform in
/// this crate.
///
/// # Examples
/// ```rust
/// use mmreg_core::Volume;
///
/// let volume = Volume::from_fn([2, 3, 4], |z, y, x| (z * 100 + y * 10 + x) as f64);
/// assert_eq!(volume.shape(), [2, 3, 4]);
/// assert_eq!(volume.get(1, 2, 3), 123.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume<T> {
    shape: [usize; 3],
    data: Vec<T>,
}

impl<T: Copy> Volume<T> {
    /// Wrap an existing buffer.
    ///
    /// Fails with [`CoreError::DataLength`] when `data.len()` is not the
    /// product of `shape`.
    pub fn new(shape: [usize; 3], data: Vec<T>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(CoreError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a volume filled with one value.
    pub fn filled(shape: [usize; 3], value: T) -> Self {
        Self {
            shape,
            data: vec![value; shape.iter().product()],
        }
    }

    /// Create a volume by evaluating `f(z, y, x)` at every voxel.
    pub fn from_fn(shape: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(shape.iter().product());
        for z in 0..shape[0] {
            for y in 0..shape[1] {
                for x in 0..shape[2] {
                    data.push(f(z, y, x));
                }
            }
        }
        Self { shape, data }
    }

    /// Shape as `[nz, ny, nx]`.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the volume has no voxels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index of voxel `(z, y, x)`.
    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.shape[1] + y) * self.shape[2] + x
    }

    /// Sample at voxel `(z, y, x)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> T {
        self.data[self.index(z, y, x)]
    }

    /// Overwrite the sample at voxel `(z, y, x)`.
    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: T) {
        let i = self.index(z, y, x);
        self.data[i] = value;
    }

    /// Underlying samples in C order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying samples.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the volume and return its buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Apply `f` to every sample.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Volume<U> {
        Volume {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Geometric centre in voxel coordinates, `(shape - 1) / 2` per axis.
    pub fn centre(&self) -> [f64; 3] {
        centre_of(self.shape)
    }

    /// Copy of the interior obtained by removing `margin` voxels from every face.
    ///
    /// With `margin == 0` the copy has the full shape. When the margin eats the
    /// whole volume along an axis, that axis has extent zero.
    pub fn crop_margin(&self, margin: usize) -> Volume<T> {
        let shape = cropped_shape(self.shape, margin);
        let mut data = Vec::with_capacity(shape.iter().product());
        for z in 0..shape[0] {
            for y in 0..shape[1] {
                let start = self.index(z + margin, y + margin, margin);
                data.extend_from_slice(&self.data[start..start + shape[2]]);
            }
        }
        Volume { shape, data }
    }

    /// Fail with [`CoreError::ShapeMismatch`] unless `other` has the same shape.
    pub fn ensure_same_shape<U>(&self, other: &Volume<U>) -> Result<()> {
        if self.shape != other.shape {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape,
                actual: other.shape,
            });
        }
        Ok(())
    }
}

impl Volume<f64> {
    /// Volume of zeros.
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Minimum and maximum over finite samples, `None` when there are none.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Centre of a grid of the given shape.
#[inline]
pub fn centre_of(shape: [usize; 3]) -> [f64; 3] {
    [
        (shape[0] as f64 - 1.0) / 2.0,
        (shape[1] as f64 - 1.0) / 2.0,
        (shape[2] as f64 - 1.0) / 2.0,
    ]
}

/// Shape left after removing `margin` voxels from both ends of every axis.
#[inline]
pub fn cropped_shape(shape: [usize; 3], margin: usize) -> [usize; 3] {
    [
        shape[0].saturating_sub(2 * margin),
        shape[1].saturating_sub(2 * margin),
        shape[2].saturating_sub(2 * margin),
    ]
}
