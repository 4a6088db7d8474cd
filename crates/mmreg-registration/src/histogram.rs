//! Joint intensity histogram of two co-located volumes.
//!
//! Rows index the bucket of the first volume (the reference), columns the
//! bucket of the second (the moving volume). Voxels where either sample is
//! `NaN` are excluded.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use mmreg_core::{IntensityScale, Volume};
use crate::error::{RegistrationError, Result};
use crate::validation::validate_volume_shapes;

/// Joint histogram with raw counts and normalised mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointHistogram {
    bins: usize,
    counts: Vec<f64>,
    mass: Vec<f64>,
}

/// Bucket of a value already expressed in bin units.
#[inline]
pub fn bin_of_units(value: f64, bins: usize) -> Option<usize> {
    if value.is_nan() {
        return None;
    }
    Some((value.floor().max(0.0) as usize).min(bins - 1))
}

impl JointHistogram {
    /// Histogram over the finite data range of each volume.
    pub fn build(a: &Volume<f64>, b: &Volume<f64>, bins: usize) -> Result<Self> {
        validate_volume_shapes(a, b)?;
        let scale_a = IntensityScale::from_volume(a, bins)?;
        let scale_b = IntensityScale::from_volume(b, bins)?;
        Self::build_with_scales(a, b, &scale_a, &scale_b)
    }

    /// Histogram using explicit grey limits for each volume.
    pub fn build_with_scales(
        a: &Volume<f64>,
        b: &Volume<f64>,
        scale_a: &IntensityScale,
        scale_b: &IntensityScale,
    ) -> Result<Self> {
        validate_volume_shapes(a, b)?;
        if scale_a.bins() != scale_b.bins() {
            return Err(RegistrationError::invalid_configuration(format!(
                "scales disagree on bin count: {} vs {}",
                scale_a.bins(),
                scale_b.bins()
            )));
        }
        let bins = scale_a.bins();
        Ok(Self::accumulate(a, b, bins, |va, vb| {
            Some((scale_a.bin_index(va)?, scale_b.bin_index(vb)?))
        }))
    }

    /// Histogram of volumes already converted to bin units.
    ///
    /// The bucket of a sample is `floor(value)` clamped to `[0, bins - 1]`.
    pub fn from_bin_units(a: &Volume<f64>, b: &Volume<f64>, bins: usize) -> Result<Self> {
        validate_volume_shapes(a, b)?;
        if bins == 0 {
            return Err(RegistrationError::invalid_configuration("bins must be positive"));
        }
        Ok(Self::accumulate(a, b, bins, |va, vb| {
            Some((bin_of_units(va, bins)?, bin_of_units(vb, bins)?))
        }))
    }

    /// Wrap a row-major `bins × bins` table of non-negative counts.
    pub fn from_counts(bins: usize, counts: Vec<f64>) -> Result<Self> {
        if bins == 0 {
            return Err(RegistrationError::invalid_configuration("bins must be positive"));
        }
        if counts.len() != bins * bins {
            return Err(RegistrationError::shape_mismatch(
                &[bins, bins],
                &[counts.len()],
            ));
        }
        if counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(RegistrationError::invalid_configuration(
                "histogram counts must be finite and non-negative",
            ));
        }
        let mass = normalise(&counts);
        Ok(Self { bins, counts, mass })
    }

    fn accumulate<F>(a: &Volume<f64>, b: &Volume<f64>, bins: usize, bucket: F) -> Self
    where
        F: Fn(f64, f64) -> Option<(usize, usize)> + Sync,
    {
        let counts = a
            .as_slice()
            .par_iter()
            .zip(b.as_slice().par_iter())
            .fold(
                || vec![0.0f64; bins * bins],
                |mut acc, (&va, &vb)| {
                    if let Some((i, j)) = bucket(va, vb) {
                        acc[i * bins + j] += 1.0;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0f64; bins * bins],
                |mut x, y| {
                    for (p, q) in x.iter_mut().zip(y) {
                        *p += q;
                    }
                    x
                },
            );
        let mass = normalise(&counts);
        Self { bins, counts, mass }
    }

    /// Bucket count per axis.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Normalised mass of bucket `(i, j)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.mass[i * self.bins + j]
    }

    /// Raw count of bucket `(i, j)`.
    #[inline]
    pub fn count(&self, i: usize, j: usize) -> f64 {
        self.counts[i * self.bins + j]
    }

    /// Normalised mass, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.mass
    }

    /// Number of voxel pairs that were counted.
    pub fn sample_count(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Sum of `ln(count)` over non-empty buckets.
    pub fn log_likelihood(&self) -> f64 {
        self.counts
            .iter()
            .filter(|c| **c > 0.0)
            .map(|c| c.ln())
            .sum()
    }
}

/// Mass that sums to one, or all zeros when nothing was counted.
fn normalise(counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total > 0.0 {
        counts.iter().map(|c| c / total).collect()
    } else {
        vec![0.0; counts.len()]
    }
}
