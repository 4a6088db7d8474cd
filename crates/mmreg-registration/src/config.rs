//! Configuration for the phase model and the registration loop.

use serde::{Deserialize, Serialize};
use crate::error::{RegistrationError, Result};
use crate::validation::{
    validate_bins, validate_delta_phi_min, validate_iterations, validate_margin,
};

/// Bucket counts accepted for the joint histogram and phase table.
pub const SUPPORTED_BINS: [usize; 3] = [64, 128, 256];

/// Scalar settings of one registration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Voxels excluded along every face.
    pub margin: usize,
    /// Upper bound on Gauss-Newton iterations.
    pub max_iterations: usize,
    /// Convergence threshold on `‖Δ‖`.
    pub delta_phi_min: f64,
    /// Histogram bucket count, one of [`SUPPORTED_BINS`].
    pub bins: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            margin: 5,
            max_iterations: 10,
            delta_phi_min: 0.001,
            bins: 64,
        }
    }
}

impl RegistrationConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the margin.
    pub fn with_margin(mut self, margin: usize) -> Self {
        self.margin = margin;
        self
    }

    /// Set the iteration limit.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold.
    pub fn with_delta_phi_min(mut self, delta_phi_min: f64) -> Self {
        self.delta_phi_min = delta_phi_min;
        self
    }

    /// Set the bucket count.
    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }

    /// Check the shape-independent settings.
    pub fn validate(&self) -> Result<()> {
        validate_bins(self.bins)?;
        validate_iterations(self.max_iterations)?;
        validate_delta_phi_min(self.delta_phi_min)?;
        Ok(())
    }

    /// Check every setting against the volume shape.
    pub fn validate_for_shape(&self, shape: [usize; 3]) -> Result<()> {
        self.validate()?;
        validate_margin(self.margin, shape)
    }

    /// Minimum number of iterations before convergence may be declared.
    pub fn min_iterations(&self) -> usize {
        self.max_iterations.min(2)
    }
}

/// Levenberg-Marquardt settings for ellipse fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the largest parameter change.
    pub convergence_threshold: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a rejected step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on an accepted step.
    pub lambda_down: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            convergence_threshold: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

impl FitConfig {
    /// Check the damping schedule.
    pub fn validate(&self) -> Result<()> {
        validate_iterations(self.max_iterations)?;
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.convergence_threshold) || !positive(self.initial_lambda) {
            return Err(RegistrationError::invalid_configuration(
                "fit tolerance and initial damping must be positive",
            ));
        }
        if !(self.lambda_up > 1.0) || !(self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "damping factors must satisfy up > 1 and 0 < down < 1, got up={} down={}",
                self.lambda_up, self.lambda_down
            )));
        }
        Ok(())
    }
}

/// Local-maximum search settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSearchConfig {
    /// Minimum Chebyshev distance, in bins, between two reported peaks.
    pub min_distance: usize,
    /// Maximum number of peaks reported.
    pub max_peaks: usize,
}

impl PeakSearchConfig {
    /// Defaults scaled to the bucket count: `bins / 20` apart, at most ten peaks.
    pub fn for_bins(bins: usize) -> Self {
        Self {
            min_distance: bins / 20,
            max_peaks: 10,
        }
    }
}

impl Default for PeakSearchConfig {
    fn default() -> Self {
        Self::for_bins(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistrationConfig::default();
        assert_eq!(config.margin, 5);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.delta_phi_min, 0.001);
        assert_eq!(config.bins, 64);
        assert!(config.validate().is_ok());
        assert_eq!(config.min_iterations(), 2);
        assert_eq!(config.with_max_iterations(1).min_iterations(), 1);
    }

    #[test]
    fn test_builder_and_validation() {
        let config = RegistrationConfig::new()
            .with_margin(3)
            .with_max_iterations(10)
            .with_delta_phi_min(1e-4)
            .with_bins(128);
        assert!(config.validate_for_shape([20, 20, 20]).is_ok());
        assert!(config.validate_for_shape([6, 20, 20]).is_err());
        assert!(config.with_bins(100).validate().is_err());
        assert!(config.with_max_iterations(0).validate().is_err());
        assert!(config.with_delta_phi_min(0.0).validate().is_err());
        assert!(config.with_delta_phi_min(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_zero_margin_is_valid() {
        let config = RegistrationConfig::new().with_margin(0);
        assert!(config.validate_for_shape([4, 4, 4]).is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = RegistrationConfig::new().with_margin(2);
        let json = serde_json::to_string(&config).unwrap();
        let back: RegistrationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_fit_config_validation() {
        assert!(FitConfig::default().validate().is_ok());
        let bad = FitConfig {
            lambda_down: 2.0,
            ..FitConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_peak_search_defaults() {
        let config = PeakSearchConfig::for_bins(128);
        assert_eq!(config.min_distance, 6);
        assert_eq!(config.max_peaks, 10);
    }
}
