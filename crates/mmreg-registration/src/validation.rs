//! Validation utilities for registration operations.
//!
//! This module provides validation functions for input shapes and
//! configuration values, and the convergence test on `‖ΔPhi‖`.

use mmreg_core::Volume;
use crate::config::SUPPORTED_BINS;
use crate::error::{RegistrationError, Result};

/// Validate that two volumes have the same shape.
pub fn validate_volume_shapes<T: Copy, U: Copy>(
    reference: &Volume<T>,
    moving: &Volume<U>,
) -> Result<()> {
    let reference_shape = reference.shape();
    let moving_shape = moving.shape();

    if reference_shape != moving_shape {
        return Err(RegistrationError::shape_mismatch(
            &reference_shape,
            &moving_shape,
        ));
    }

    Ok(())
}

/// Validate the histogram bucket count.
pub fn validate_bins(bins: usize) -> Result<()> {
    if !SUPPORTED_BINS.contains(&bins) {
        return Err(RegistrationError::invalid_configuration(format!(
            "bins must be one of {:?}, got {}",
            SUPPORTED_BINS, bins
        )));
    }
    Ok(())
}

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Iterations must be positive",
        ));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Iterations too large: {}",
            iterations
        )));
    }

    Ok(())
}

/// Validate the convergence threshold.
pub fn validate_delta_phi_min(delta_phi_min: f64) -> Result<()> {
    if !delta_phi_min.is_finite() || delta_phi_min <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "delta_phi_min must be finite and positive, got {}",
            delta_phi_min
        )));
    }
    Ok(())
}

/// Validate the margin against the volume shape: `margin < min(shape) / 2`.
pub fn validate_margin(margin: usize, shape: [usize; 3]) -> Result<()> {
    let smallest = shape.iter().copied().min().unwrap_or(0);
    if 2 * margin >= smallest {
        return Err(RegistrationError::invalid_configuration(format!(
            "margin {} leaves no interior in shape {:?}",
            margin, shape
        )));
    }
    Ok(())
}

/// Convergence test on the increment norm.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceChecker {
    /// Threshold on `‖Δ‖`.
    pub delta_phi_min: f64,
    /// Iterations that must run before convergence is accepted.
    pub min_iterations: usize,
}

impl ConvergenceChecker {
    /// Create a new convergence checker.
    pub fn new(delta_phi_min: f64, min_iterations: usize) -> Self {
        Self {
            delta_phi_min,
            min_iterations,
        }
    }

    /// Whether iteration `iteration` with increment norm `delta_phi_norm` converged.
    pub fn check_convergence(&self, iteration: usize, delta_phi_norm: f64) -> bool {
        iteration >= self.min_iterations && delta_phi_norm < self.delta_phi_min
    }
}
