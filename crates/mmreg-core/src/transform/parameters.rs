//! Translation / rotation / zoom parameterisation of Phi.
//!
//! Composition order is fixed: `Phi = T · R · diag(z)`. The rotation is a
//! rotation vector (axis times angle in radians) with `(z, y, x)`
//! components, turned into a matrix with Rodrigues' formula.
//!
//! Decomposition uses the polar decomposition `F = R · U` of the linear
//! block, computed from its SVD. It is exact for rotation angles in
//! `[0, π)` and strictly positive zooms; reflections and vanishing scales
//! are rejected.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};
use super::phi::Phi;

/// Smallest singular value accepted by [`decompose`].
pub const MIN_SINGULAR_VALUE: f64 = 1e-12;

/// The nine numbers that define a rigid-plus-zoom transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParameters {
    /// Translation `(dz, dy, dx)` in voxels.
    pub t: [f64; 3],
    /// Rotation vector in radians.
    pub r: [f64; 3],
    /// Diagonal zoom.
    pub z: [f64; 3],
}

impl TransformParameters {
    /// No translation, no rotation, unit zoom.
    pub fn identity() -> Self {
        Self {
            t: [0.0; 3],
            r: [0.0; 3],
            z: [1.0; 3],
        }
    }

    /// Build Phi as `T · R(r) · diag(z)`.
    pub fn compose(&self) -> Phi {
        compose(self)
    }
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self::identity()
    }
}

/// Full result of [`decompose`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    /// Translation, rotation vector and zoom.
    pub parameters: TransformParameters,
    /// Orthogonal factor `R` of `F = R · U`.
    pub rotation: Matrix3<f64>,
    /// Symmetric right stretch tensor `U`.
    pub stretch: Matrix3<f64>,
    /// `det(F) - 1`.
    pub volumetric_change: f64,
}

/// Build Phi from translation, rotation vector and zoom.
pub fn compose(params: &TransformParameters) -> Phi {
    let rotation = Rotation3::from_scaled_axis(Vector3::from(params.r)).into_inner();
    let linear = rotation * Matrix3::from_diagonal(&Vector3::from(params.z));

    let mut block = [0.0; 12];
    for i in 0..3 {
        for j in 0..3 {
            block[4 * i + j] = linear[(i, j)];
        }
        block[4 * i + 3] = params.t[i];
    }
    Phi::from_affine_block(block)
}

/// Split Phi into translation, rotation and stretch.
///
/// Fails with [`CoreError::Reflection`] when `det(F) < 0` and with
/// [`CoreError::DegenerateScale`] when the smallest singular value of `F`
/// is below [`MIN_SINGULAR_VALUE`].
pub fn decompose(phi: &Phi) -> Result<Decomposition> {
    let f = phi.linear();
    let det = f.determinant();
    if !det.is_finite() {
        return Err(CoreError::singular(format!("non-finite determinant {}", det)));
    }

    let svd = f.svd(true, true);
    let smallest = svd.singular_values.min();
    if smallest < MIN_SINGULAR_VALUE {
        return Err(CoreError::DegenerateScale {
            singular_value: smallest,
        });
    }
    if det < 0.0 {
        return Err(CoreError::Reflection { determinant: det });
    }
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(CoreError::singular("SVD did not converge")),
    };

    let rotation = u * v_t;
    let stretch = rotation.transpose() * f;
    let stretch = (stretch + stretch.transpose()) * 0.5;

    let t = phi.translation();
    let r = rotation_vector(&rotation);
    let parameters = TransformParameters {
        t: [t[0], t[1], t[2]],
        r: [r[0], r[1], r[2]],
        z: [stretch[(0, 0)], stretch[(1, 1)], stretch[(2, 2)]],
    };

    Ok(Decomposition {
        parameters,
        rotation,
        stretch,
        volumetric_change: det - 1.0,
    })
}

/// Rotation vector of a proper rotation matrix, angle in `[0, π]`.
fn rotation_vector(rotation: &Matrix3<f64>) -> Vector3<f64> {
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
    let (w, mut v) = (q.w, q.imag());
    if w < 0.0 {
        v = -v;
    }
    let s = v.norm();
    if s < f64::EPSILON {
        return Vector3::zeros();
    }
    let angle = 2.0 * s.atan2(w.abs());
    v * (angle / s)
}
