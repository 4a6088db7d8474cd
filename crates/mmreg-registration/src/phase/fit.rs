//! Ellipse fit of one joint-histogram peak.
//!
//! The peak is modelled as `z · exp(-½ (a·dx² + 2b·dx·dy + c·dy²))` with the
//! centre and the height held fixed. Buckets further than the fit radius
//! from the peak (centre to centre) are fitted as zero.

use crate::config::FitConfig;
use crate::error::{RegistrationError, Result};
use crate::histogram::JointHistogram;
use super::gaussian::{GaussianPhase, Peak};
use super::lm::{optimize, LMModel, LMResult, Samples};

/// Quadratic form of a fitted peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Residual sum of squares.
    pub chi2: f64,
    pub iterations: usize,
}

struct CentredGaussian {
    height: f64,
}

impl LMModel<3> for CentredGaussian {
    #[inline]
    fn evaluate(&self, dx: f64, dy: f64, p: &[f64; 3]) -> f64 {
        let q = p[0] * dx * dx + 2.0 * p[1] * dx * dy + p[2] * dy * dy;
        self.height * (-0.5 * q).exp()
    }

    #[inline]
    fn jacobian_row(&self, dx: f64, dy: f64, p: &[f64; 3]) -> [f64; 3] {
        let f = self.evaluate(dx, dy, p);
        [-0.5 * dx * dx * f, -dx * dy * f, -0.5 * dy * dy * f]
    }
}

/// Fit the quadratic form of the Gaussian centred on `peak`.
///
/// The search starts from `(1, 1, 1)`. If it does not
/// converge to a positive definite form, a second search starts from the
/// inverse second moments of the windowed mass.
pub fn fit_ellipse(
    hist: &JointHistogram,
    peak: &Peak,
    fit_radius: f64,
    config: &FitConfig,
) -> Result<EllipseFit> {
    config.validate()?;
    if !fit_radius.is_finite() || fit_radius < 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "fit radius must be finite and non-negative, got {}",
            fit_radius
        )));
    }
    if !(peak.mass > 0.0) || !peak.mass.is_finite() {
        return Err(RegistrationError::degenerate_fit(format!(
            "peak ({}, {}) holds no mass",
            peak.row, peak.col
        )));
    }

    let samples = windowed_samples(hist, peak, fit_radius);
    let model = CentredGaussian { height: peak.mass };

    let first = optimize(&model, &samples, [1.0, 1.0, 1.0], config);
    if let Some(fit) = accept(&first) {
        return Ok(fit);
    }

    if let Some(guess) = moment_guess(&samples) {
        tracing::debug!(
            "fit at ({}, {}) retrying from moments a={:.4e} b={:.4e} c={:.4e}",
            peak.row,
            peak.col,
            guess[0],
            guess[1],
            guess[2]
        );
        let second = optimize(&model, &samples, guess, config);
        if let Some(fit) = accept(&second) {
            return Ok(fit);
        }
    }

    let [a, b, c] = first.params;
    Err(RegistrationError::degenerate_fit(format!(
        "peak ({}, {}) with radius {:.2}: a={:.4e} b={:.4e} c={:.4e} after {} iterations",
        peak.row, peak.col, fit_radius, a, b, c, first.iterations
    )))
}

/// Fit `peak` and wrap the result as a phase.
pub fn fit_phase(
    hist: &JointHistogram,
    peak: &Peak,
    fit_radius: f64,
    config: &FitConfig,
) -> Result<GaussianPhase> {
    let fit = fit_ellipse(hist, peak, fit_radius, config)?;
    let (x, y) = peak.centre();
    let phase = GaussianPhase {
        x,
        y,
        z: peak.mass,
        a: fit.a,
        b: fit.b,
        c: fit.c,
        fit_radius,
        fitted: true,
    };
    phase.validate()?;
    Ok(phase)
}

/// All buckets as offsets from the peak, zeroed outside the radius.
fn windowed_samples(hist: &JointHistogram, peak: &Peak, fit_radius: f64) -> Samples {
    let bins = hist.bins();
    let mut samples = Samples::with_capacity(bins * bins);
    let r2 = fit_radius * fit_radius;
    for row in 0..bins {
        for col in 0..bins {
            let dx = row as f64 - peak.row as f64;
            let dy = col as f64 - peak.col as f64;
            let inside = dx * dx + dy * dy <= r2;
            samples.push(dx, dy, if inside { hist.get(row, col) } else { 0.0 });
        }
    }
    samples
}

fn accept(result: &LMResult<3>) -> Option<EllipseFit> {
    let [a, b, c] = result.params;
    let proper = [a, b, c].iter().all(|v| v.is_finite()) && a > 0.0 && a * c - b * b > 0.0;
    (result.converged && proper).then_some(EllipseFit {
        a,
        b,
        c,
        chi2: result.chi2,
        iterations: result.iterations,
    })
}

/// Inverse of the mass-weighted second-moment matrix.
fn moment_guess(samples: &Samples) -> Option<[f64; 3]> {
    let (mut w, mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0, 0.0);
    for ((&dx, &dy), &v) in samples.x.iter().zip(&samples.y).zip(&samples.z) {
        if v > 0.0 {
            w += v;
            sxx += v * dx * dx;
            sxy += v * dx * dy;
            syy += v * dy * dy;
        }
    }
    if !(w > 0.0) {
        return None;
    }
    let (sxx, sxy, syy) = (sxx / w, sxy / w, syy / w);
    let det = sxx * syy - sxy * sxy;
    if !(det > 0.0) || !det.is_finite() {
        return None;
    }
    Some([syy / det, -sxy / det, sxx / det])
}
