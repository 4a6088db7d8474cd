//! Levenberg-Marquardt least squares for small parametric surfaces.

use nalgebra::{SMatrix, SVector};
use crate::config::FitConfig;

/// Damping above which the search gives up.
const MAX_LAMBDA: f64 = 1e10;

/// Outcome of one optimisation.
#[derive(Debug, Clone, Copy)]
pub struct LMResult<const N: usize> {
    pub params: [f64; N],
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// A surface `z = f(x, y; params)` fitted by [`optimize`].
pub trait LMModel<const N: usize> {
    /// Evaluate the model at a point.
    fn evaluate(&self, x: f64, y: f64, params: &[f64; N]) -> f64;

    /// Partial derivatives with respect to each parameter.
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; N]) -> [f64; N];
}

/// Sample points of the surface being fitted.
#[derive(Debug, Clone, Default)]
pub struct Samples {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl Samples {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((&x, &y), &z)| (x, y, z))
    }
}

/// Minimise `Σ (z - f(x, y))²` starting from `initial`.
///
/// A step is kept only when it lowers chi². The search stops when the
/// largest parameter change of a kept step falls below the configured
/// threshold, when the damped system is singular, or when the damping
/// exceeds [`MAX_LAMBDA`]. Hitting the damping cap after at least one kept
/// step counts as converged: no step can improve the fit any further.
pub fn optimize<const N: usize, M: LMModel<N>>(
    model: &M,
    samples: &Samples,
    initial: [f64; N],
    config: &FitConfig,
) -> LMResult<N> {
    let mut params = initial;
    let mut lambda = config.initial_lambda;
    let mut prev_chi2 = chi2(model, samples, &params);
    let mut converged = false;
    let mut improved = false;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let (hessian, gradient) = normal_equations(model, samples, &params);
        let mut damped = hessian;
        for i in 0..N {
            damped[(i, i)] *= 1.0 + lambda;
        }

        let Some(delta) = solve(&damped, &gradient) else {
            break;
        };

        let mut candidate = params;
        for (p, d) in candidate.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        let new_chi2 = chi2(model, samples, &candidate);

        // NaN or overflowing chi² never counts as an improvement
        if new_chi2 < prev_chi2 {
            params = candidate;
            prev_chi2 = new_chi2;
            lambda *= config.lambda_down;
            improved = true;

            let max_delta = delta.iter().fold(0.0f64, |a, d| a.max(d.abs()));
            if max_delta < config.convergence_threshold {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > MAX_LAMBDA {
                converged = improved;
                break;
            }
        }
    }

    LMResult {
        params,
        chi2: prev_chi2,
        converged,
        iterations,
    }
}

/// Cholesky solve of the damped normal equations.
///
/// `None` when the system is not positive definite, when a pivot of the
/// factor falls below `1e-7` of the largest one, or when the solution is not
/// finite.
fn solve<const N: usize>(a: &SMatrix<f64, N, N>, b: &SVector<f64, N>) -> Option<SVector<f64, N>> {
    let cholesky = a.cholesky()?;
    let pivots = cholesky.l_dirty().diagonal();
    if !(pivots.min() > 1e-7 * pivots.amax()) {
        return None;
    }
    let x = cholesky.solve(b);
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn chi2<const N: usize, M: LMModel<N>>(model: &M, samples: &Samples, params: &[f64; N]) -> f64 {
    samples
        .iter()
        .map(|(x, y, z)| {
            let residual = z - model.evaluate(x, y, params);
            residual * residual
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr` at `params`.
fn normal_equations<const N: usize, M: LMModel<N>>(
    model: &M,
    samples: &Samples,
    params: &[f64; N],
) -> (SMatrix<f64, N, N>, SVector<f64, N>) {
    let mut hessian = SMatrix::<f64, N, N>::zeros();
    let mut gradient = SVector::<f64, N>::zeros();
    for (x, y, z) in samples.iter() {
        let row = SVector::<f64, N>::from(model.jacobian_row(x, y, params));
        let residual = z - model.evaluate(x, y, params);
        hessian.ger(1.0, &row, &row, 1.0);
        gradient.axpy(residual, &row, 1.0);
    }
    (hessian, gradient)
}
