//! Homogeneous 4×4 transform ("Phi").
//!
//! Phi maps centred voxel coordinates `(z, y, x, 1)` of the reference grid
//! onto the moving grid. Its bottom row is always `[0, 0, 0, 1]` and its
//! top-left 3×3 block holds rotation and scale.

use std::ops::Mul;
use nalgebra::{Matrix3, Matrix4, SVector, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};
use super::trait_::Transform;

/// Tolerance on the bottom row when accepting an external matrix.
const HOMOGENEOUS_TOLERANCE: f64 = 1e-12;

/// A 3D homogeneous transform in `(z, y, x)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Phi(Matrix4<f64>);

impl Phi {
    /// The identity transform.
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Wrap a 4×4 matrix, checking the homogeneous bottom row.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Result<Self> {
        let row = [
            matrix[(3, 0)],
            matrix[(3, 1)],
            matrix[(3, 2)],
            matrix[(3, 3)],
        ];
        let expected = [0.0, 0.0, 0.0, 1.0];
        let ok = row
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| (a - b).abs() <= HOMOGENEOUS_TOLERANCE);
        if !ok {
            return Err(CoreError::NotHomogeneous(row));
        }
        let mut m = matrix;
        m.set_row(3, &Vector4::new(0.0, 0.0, 0.0, 1.0).transpose());
        Ok(Self(m))
    }

    /// Pure translation by `t = (dz, dy, dx)` voxels.
    pub fn from_translation(t: [f64; 3]) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = t[0];
        m[(1, 3)] = t[1];
        m[(2, 3)] = t[2];
        Self(m)
    }

    /// Build from the 12 entries of the top 3×4 block, row by row.
    pub fn from_affine_block(block: [f64; 12]) -> Self {
        let mut m = Matrix4::identity();
        for (k, v) in block.iter().enumerate() {
            m[(k / 4, k % 4)] = *v;
        }
        Self(m)
    }

    /// The 12 entries of the top 3×4 block, row by row.
    pub fn affine_block(&self) -> [f64; 12] {
        let mut out = [0.0; 12];
        for (k, v) in out.iter_mut().enumerate() {
            *v = self.0[(k / 4, k % 4)];
        }
        out
    }

    /// Underlying matrix.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// Consume and return the matrix.
    pub fn into_matrix(self) -> Matrix4<f64> {
        self.0
    }

    /// Linear 3×3 block `F`.
    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Translation column.
    pub fn translation(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Homogeneous inverse: `[L⁻¹, -L⁻¹·t; 0, 1]`.
    pub fn inverse(&self) -> Result<Self> {
        let l = self.linear();
        let l_inv = l.try_inverse().ok_or_else(|| {
            CoreError::singular(format!("linear block has determinant {:e}", l.determinant()))
        })?;
        let t_inv = -(l_inv * self.translation());
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&l_inv);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&t_inv);
        Ok(Self(m))
    }

    /// `self · other`: apply `other` first, then `self`.
    pub fn then_apply(&self, other: &Phi) -> Self {
        Self(self.0 * other.0)
    }

    /// Gauss-Newton update `Phi · (I + ΔPhi)`.
    ///
    /// `delta` is reshaped row by row into the top 3×4 block of `ΔPhi`; the
    /// bottom row of `ΔPhi` is zero.
    pub fn increment(&self, delta: &SVector<f64, 12>) -> Self {
        let mut step = Matrix4::identity();
        for (k, v) in delta.iter().enumerate() {
            step[(k / 4, k % 4)] += *v;
        }
        Self(self.0 * step)
    }

    /// Same transform expressed on a grid binned by `ratio`.
    ///
    /// Only the translation column scales; the linear block is unchanged.
    pub fn rescaled(&self, ratio: f64) -> Self {
        let mut m = self.0;
        for i in 0..3 {
            m[(i, 3)] *= ratio;
        }
        Self(m)
    }

    /// Apply to a centred point.
    #[inline]
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[(0, 0)] * p[0] + m[(0, 1)] * p[1] + m[(0, 2)] * p[2] + m[(0, 3)],
            m[(1, 0)] * p[0] + m[(1, 1)] * p[1] + m[(1, 2)] * p[2] + m[(1, 3)],
            m[(2, 0)] * p[0] + m[(2, 1)] * p[1] + m[(2, 2)] * p[2] + m[(2, 3)],
        ]
    }
}

impl Default for Phi {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Phi {
    type Output = Phi;

    fn mul(self, rhs: Phi) -> Phi {
        self.then_apply(&rhs)
    }
}

impl Transform for Phi {
    #[inline]
    fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        self.apply(point)
    }
}
