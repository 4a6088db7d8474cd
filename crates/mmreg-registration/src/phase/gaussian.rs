//! Gaussian phase records and histogram peaks.

use serde::{Deserialize, Serialize};
use crate::error::{RegistrationError, Result};

/// A local maximum of the joint histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Bucket of the reference volume.
    pub row: usize,
    /// Bucket of the moving volume.
    pub col: usize,
    /// Normalised mass of the bucket.
    pub mass: f64,
}

impl Peak {
    /// Bucket centre in bin units.
    pub fn centre(&self) -> (f64, f64) {
        (self.row as f64 + 0.5, self.col as f64 + 0.5)
    }
}

/// One component of the Gaussian mixture model of the joint histogram.
///
/// The density is `z · exp(-½ (a·dx² + 2b·dx·dy + c·dy²))` with
/// `dx = f - x` along the reference axis and `dy = g - y` along the moving
/// axis, all in bin units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianPhase {
    pub x: f64,
    pub y: f64,
    /// Peak mass.
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Radius used for the last fit, in bins.
    pub fit_radius: f64,
    /// Whether `(a, b, c)` come from a fit.
    pub fitted: bool,
}

impl GaussianPhase {
    /// A phase with given centre, mass and quadratic form.
    pub fn new(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64) -> Self {
        Self {
            x,
            y,
            z,
            a,
            b,
            c,
            fit_radius: 0.0,
            fitted: true,
        }
    }

    /// `a·dx² + 2b·dx·dy + c·dy²` at `(f, g)`.
    #[inline]
    pub fn quadratic_form(&self, f: f64, g: f64) -> f64 {
        let dx = f - self.x;
        let dy = g - self.y;
        self.a * dx * dx + 2.0 * self.b * dx * dy + self.c * dy * dy
    }

    /// `a·c - b²`.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.a * self.c - self.b * self.b
    }

    /// Whether the quadratic form defines a proper ellipse.
    pub fn is_positive_definite(&self) -> bool {
        let finite = [self.x, self.y, self.z, self.a, self.b, self.c]
            .iter()
            .all(|v| v.is_finite());
        finite && self.a > 0.0 && self.determinant() > 0.0
    }

    /// Fail with [`RegistrationError::DegenerateFit`] unless positive definite.
    pub fn validate(&self) -> Result<()> {
        if !self.is_positive_definite() {
            return Err(RegistrationError::degenerate_fit(format!(
                "phase at ({:.2}, {:.2}) has a={:.4e} b={:.4e} c={:.4e}, a*c - b^2 = {:.4e}",
                self.x,
                self.y,
                self.a,
                self.b,
                self.c,
                self.determinant()
            )));
        }
        Ok(())
    }
}
