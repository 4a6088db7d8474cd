//! Per-voxel Gauss-Newton operators and diagnostic fields.
//!
//! For a voxel at centred position `p = (z, y, x)` with reference value `f`,
//! deformed moving value `g` and moving gradient `∇g`, the cost is
//! `½ q(f, g)` of the voxel's phase. Moving the sample point by `ΔPhi · p`
//! changes `g` by `J · Δ` with `J[4i + j] = ∇g[i] · (p, 1)[j]`. Each voxel
//! contributes `c · J Jᵀ` to `M` and `-r · J` to `A`, where
//! `r = ∂(½q)/∂g = b·(f - x₀) + c·(g - y₀)`.

use std::ops::Add;

use nalgebra::{SMatrix, SVector};
use rayon::prelude::*;
use mmreg_core::filter::Gradient;
use mmreg_core::volume::cropped_shape;
use mmreg_core::Volume;
use crate::phase::{GaussianPhase, PhaseDiagram};

/// Normal equations `M · Δ = A` of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Operators {
    pub m: SMatrix<f64, 12, 12>,
    pub a: SVector<f64, 12>,
    /// Voxels that contributed.
    pub voxels: usize,
}

impl Operators {
    pub fn zeros() -> Self {
        Self {
            m: SMatrix::zeros(),
            a: SVector::zeros(),
            voxels: 0,
        }
    }

    /// `Δ = M⁻¹ · A`, `None` when `M` is singular or the solution is not finite.
    pub fn solve(&self) -> Option<SVector<f64, 12>> {
        if self.voxels == 0 {
            return None;
        }
        let delta = self.m.lu().solve(&self.a)?;
        delta.iter().all(|v| v.is_finite()).then_some(delta)
    }
}

impl Add for Operators {
    type Output = Operators;

    fn add(self, rhs: Operators) -> Operators {
        Operators {
            m: self.m + rhs.m,
            a: self.a + rhs.a,
            voxels: self.voxels + rhs.voxels,
        }
    }
}

/// Phase of a sample pair, if it is classified and usable.
#[inline]
fn phase_of<'p>(
    diagram: &PhaseDiagram,
    phases: &'p [GaussianPhase],
    f: f64,
    g: f64,
) -> Option<&'p GaussianPhase> {
    let id = diagram.lookup(f, g) as usize;
    if id == 0 {
        return None;
    }
    phases.get(id - 1).filter(|p| p.is_positive_definite())
}

/// Accumulate `M` and `A` over the interior left by `margin`.
///
/// `reference` and `deformed` are in bin units; voxels with a `NaN` sample
/// or gradient, or without a usable phase, are skipped.
pub fn accumulate(
    reference: &Volume<f64>,
    deformed: &Volume<f64>,
    gradient: &Gradient,
    diagram: &PhaseDiagram,
    phases: &[GaussianPhase],
    margin: usize,
) -> Operators {
    let [nz, ny, nx] = reference.shape();
    let centre = reference.centre();
    if nz <= 2 * margin || ny <= 2 * margin || nx <= 2 * margin {
        return Operators::zeros();
    }

    (margin..nz - margin)
        .into_par_iter()
        .fold(Operators::zeros, |mut ops, z| {
            for y in margin..ny - margin {
                for x in margin..nx - margin {
                    let f = reference.get(z, y, x);
                    let g = deformed.get(z, y, x);
                    let grad = gradient.at(z, y, x);
                    if f.is_nan() || g.is_nan() || grad.iter().any(|v| v.is_nan()) {
                        continue;
                    }
                    let Some(phase) = phase_of(diagram, phases, f, g) else {
                        continue;
                    };

                    let p = [
                        z as f64 - centre[0],
                        y as f64 - centre[1],
                        x as f64 - centre[2],
                        1.0,
                    ];
                    let mut jacobian = SVector::<f64, 12>::zeros();
                    for i in 0..3 {
                        for j in 0..4 {
                            jacobian[4 * i + j] = grad[i] * p[j];
                        }
                    }
                    let r = phase.b * (f - phase.x) + phase.c * (g - phase.y);
                    ops.a.axpy(-r, &jacobian, 1.0);
                    ops.m.ger(phase.c, &jacobian, &jacobian, 1.0);
                    ops.voxels += 1;
                }
            }
            ops
        })
        .reduce(Operators::zeros, |x, y| x + y)
}

/// Residual and phase fields over the interior left by `margin`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticFields {
    /// `½ q(f, g)` of the voxel's phase, `0` where unclassified.
    pub residual: Volume<f64>,
    /// Phase id of the voxel, `0` where unclassified.
    pub phase: Volume<u8>,
}

pub fn diagnostic_fields(
    reference: &Volume<f64>,
    deformed: &Volume<f64>,
    diagram: &PhaseDiagram,
    phases: &[GaussianPhase],
    margin: usize,
) -> DiagnosticFields {
    let shape = cropped_shape(reference.shape(), margin);
    let mut residual = Volume::zeros(shape);
    let mut phase = Volume::filled(shape, 0u8);
    let slice_len = shape[1] * shape[2];
    if slice_len == 0 || shape[0] == 0 {
        return DiagnosticFields { residual, phase };
    }

    residual
        .as_mut_slice()
        .par_chunks_mut(slice_len)
        .zip(phase.as_mut_slice().par_chunks_mut(slice_len))
        .enumerate()
        .for_each(|(z, (residual_slice, phase_slice))| {
            for y in 0..shape[1] {
                for x in 0..shape[2] {
                    let f = reference.get(z + margin, y + margin, x + margin);
                    let g = deformed.get(z + margin, y + margin, x + margin);
                    if f.is_nan() || g.is_nan() {
                        continue;
                    }
                    let id = diagram.lookup(f, g);
                    if let Some(p) = phase_of(diagram, phases, f, g) {
                        let k = y * shape[2] + x;
                        residual_slice[k] = 0.5 * p.quadratic_form(f, g);
                        phase_slice[k] = id;
                    }
                }
            }
        });
    DiagnosticFields { residual, phase }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmreg_core::gradient;

    fn single_phase_diagram(bins: usize) -> (PhaseDiagram, Vec<GaussianPhase>) {
        let diagram = PhaseDiagram::from_table(bins, vec![1u8; bins * bins]).unwrap();
        let phases = vec![GaussianPhase::new(10.5, 10.5, 1.0, 0.02, -0.01, 0.02)];
        (diagram, phases)
    }

    #[test]
    fn test_unclassified_volume_contributes_nothing() {
        let reference = Volume::from_fn([6, 6, 6], |z, y, x| (z + y + x) as f64);
        let g = gradient(&reference);
        let diagram = PhaseDiagram::from_table(64, vec![0u8; 64 * 64]).unwrap();
        let ops = accumulate(&reference, &reference, &g, &diagram, &[], 1);
        assert_eq!(ops.voxels, 0);
        assert!(ops.solve().is_none());
    }

    #[test]
    fn test_margin_limits_voxels() {
        let reference = Volume::from_fn([8, 7, 6], |z, y, x| 5.0 + (z + 2 * y + 3 * x) as f64);
        let g = gradient(&reference);
        let (diagram, phases) = single_phase_diagram(64);
        let ops = accumulate(&reference, &reference, &g, &diagram, &phases, 2);
        assert_eq!(ops.voxels, 4 * 3 * 2);
        let all = accumulate(&reference, &reference, &g, &diagram, &phases, 0);
        assert_eq!(all.voxels, 8 * 7 * 6);
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let reference = Volume::from_fn([8, 8, 8], |z, y, x| {
            8.0 + (0.4 * z as f64).sin() * 3.0 + 0.7 * y as f64 - 0.2 * x as f64
        });
        let deformed = reference.map(|v| v + 0.3);
        let g = gradient(&deformed);
        let (diagram, phases) = single_phase_diagram(64);
        let ops = accumulate(&reference, &deformed, &g, &diagram, &phases, 1);
        assert!((ops.m - ops.m.transpose()).amax() < 1e-9);
        assert!(ops.a.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_nan_voxels_skipped() {
        let reference = Volume::from_fn([4, 4, 4], |z, _, _| 3.0 + z as f64);
        let mut deformed = reference.clone();
        deformed.set(1, 1, 1, f64::NAN);
        let g = gradient(&reference);
        let (diagram, phases) = single_phase_diagram(64);
        let ops = accumulate(&reference, &deformed, &g, &diagram, &phases, 0);
        assert_eq!(ops.voxels, 63);
    }

    #[test]
    fn test_fields_follow_phase() {
        let reference = Volume::filled([5, 5, 5], 10.5);
        let deformed = Volume::filled([5, 5, 5], 12.5);
        let (diagram, phases) = single_phase_diagram(64);
        let fields = diagnostic_fields(&reference, &deformed, &diagram, &phases, 1);
        assert_eq!(fields.residual.shape(), [3, 3, 3]);
        assert_eq!(fields.phase.shape(), [3, 3, 3]);
        // dx = 0, dy = 2: ½ · 0.02 · 4
        assert!((fields.residual.get(1, 1, 1) - 0.04).abs() < 1e-12);
        assert!(fields.phase.as_slice().iter().all(|id| *id == 1));
    }

    #[test]
    fn test_degenerate_phase_ignored() {
        let reference = Volume::filled([3, 3, 3], 10.5);
        let diagram = PhaseDiagram::from_table(64, vec![1u8; 64 * 64]).unwrap();
        let phases = vec![GaussianPhase::new(10.5, 10.5, 1.0, 1.0, 2.0, 1.0)];
        let fields = diagnostic_fields(&reference, &reference, &diagram, &phases, 0);
        assert!(fields.phase.as_slice().iter().all(|id| *id == 0));
        assert!(fields.residual.as_slice().iter().all(|r| *r == 0.0));
    }
}
