//! Grey-level rescaling into histogram bins.
//!
//! Raw intensities of any range are first mapped onto the 8-bit range using
//! a pair of grey limits, then divided into `bins` equal buckets of
//! `256 / bins` grey levels each. The same mapping is available in
//! continuous form ("bin units") so that interpolation and gradients can stay
//! in floating point while phase lookup uses the integer bucket.

use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};
use super::Volume;

/// Grey limits and bucket count used to quantize one volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityScale {
    min: f64,
    max: f64,
    bins: usize,
}

impl IntensityScale {
    /// Create a scale mapping `[min, max]` onto `bins` buckets.
    ///
    /// `bins` must divide 256 so that every bucket holds the same number of
    /// 8-bit grey levels.
    pub fn new(min: f64, max: f64, bins: usize) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(CoreError::intensity_range(format!(
                "grey limits must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min >= max {
            return Err(CoreError::intensity_range(format!(
                "min ({}) must be less than max ({})",
                min, max
            )));
        }
        if bins == 0 || bins > 256 || 256 % bins != 0 {
            return Err(CoreError::intensity_range(format!(
                "bin count must divide 256, got {}",
                bins
            )));
        }
        Ok(Self { min, max, bins })
    }

    /// Scale spanning the finite data range of `volume`.
    pub fn from_volume(volume: &Volume<f64>, bins: usize) -> Result<Self> {
        let (min, max) = volume.finite_range().ok_or_else(|| {
            CoreError::intensity_range("volume has no finite samples")
        })?;
        Self::new(min, max, bins)
    }

    /// Lower grey limit.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper grey limit.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Number of buckets.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Grey levels per bucket on the 8-bit scale.
    #[inline]
    fn step(&self) -> f64 {
        (256 / self.bins) as f64
    }

    #[inline]
    fn normalized(&self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    /// Rescale to the 8-bit range, clipping outside the grey limits.
    ///
    /// Returns `None` for `NaN` samples, which mark invalid voxels.
    #[inline]
    pub fn rescale_to_u8(&self, value: f64) -> Option<u8> {
        if value.is_nan() {
            return None;
        }
        Some((self.normalized(value) * 255.0).floor() as u8)
    }

    /// Continuous position on the bucket axis, in `[0, 255 / step]`.
    ///
    /// `bin_units(v).floor()` equals `bin_index(v)` for every valid sample.
    #[inline]
    pub fn bin_units(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        self.normalized(value) * 255.0 / self.step()
    }

    /// Integer bucket of a sample, `None` for invalid samples.
    #[inline]
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        self.rescale_to_u8(value)
            .map(|v| (v as usize / (256 / self.bins)).min(self.bins - 1))
    }

    /// Map a whole volume to the 8-bit range. Invalid voxels become 0.
    pub fn volume_to_u8(&self, volume: &Volume<f64>) -> Volume<u8> {
        volume.map(|v| self.rescale_to_u8(v).unwrap_or(0))
    }

    /// Map a whole volume to continuous bin units. Invalid voxels stay `NaN`.
    pub fn volume_to_bin_units(&self, volume: &Volume<f64>) -> Volume<f64> {
        volume.map(|v| self.bin_units(v))
    }
}
