//! Interactive selection of Gaussian phases among histogram peaks.

use crate::config::{FitConfig, PeakSearchConfig};
use crate::error::{RegistrationError, Result};
use crate::histogram::JointHistogram;
use super::fit::fit_phase;
use super::gaussian::{GaussianPhase, Peak};
use super::peaks::find_local_maxima;

/// Peaks of a joint histogram and the phases fitted on a chosen subset.
///
/// Phases keep the order in which their peaks were first selected; the
/// phase id of the `k`-th selected phase is `k + 1`.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    histogram: JointHistogram,
    peaks: Vec<Peak>,
    selected: Vec<(usize, GaussianPhase)>,
    fit_config: FitConfig,
}

impl GaussianMixture {
    /// Detect the peaks of `histogram`; nothing is selected yet.
    pub fn new(histogram: JointHistogram, search: PeakSearchConfig) -> Self {
        let peaks = find_local_maxima(&histogram, search.min_distance, search.max_peaks);
        Self {
            histogram,
            peaks,
            selected: Vec::new(),
            fit_config: FitConfig::default(),
        }
    }

    /// Use `config` for subsequent fits.
    pub fn with_fit_config(mut self, config: FitConfig) -> Self {
        self.fit_config = config;
        self
    }

    pub fn histogram(&self) -> &JointHistogram {
        &self.histogram
    }

    /// Detected peaks, heaviest first.
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// Radius used when none is given: a tenth of the bucket count.
    pub fn default_fit_radius(&self) -> f64 {
        self.histogram.bins() as f64 / 10.0
    }

    /// Fit and select peak `index`.
    ///
    /// Selecting an already selected peak returns its current phase
    /// unchanged. A failed fit leaves the selection untouched.
    pub fn select(&mut self, index: usize, fit_radius: Option<f64>) -> Result<&GaussianPhase> {
        let peak = self.peak(index)?;
        if let Some(slot) = self.slot(index) {
            return Ok(&self.selected[slot].1);
        }
        let radius = fit_radius.unwrap_or_else(|| self.default_fit_radius());
        let phase = fit_phase(&self.histogram, &peak, radius, &self.fit_config)?;
        tracing::debug!(
            "selected peak {} at ({:.1}, {:.1}): a={:.4e} b={:.4e} c={:.4e}",
            index,
            phase.x,
            phase.y,
            phase.a,
            phase.b,
            phase.c
        );
        self.selected.push((index, phase));
        Ok(&self.selected[self.selected.len() - 1].1)
    }

    /// Fit a selected peak again with another radius, replacing its phase.
    ///
    /// The phase keeps its position, and hence its id, in the selection.
    /// On failure the previous phase stays selected.
    pub fn refit(&mut self, index: usize, fit_radius: f64) -> Result<&GaussianPhase> {
        let peak = self.peak(index)?;
        let slot = self.slot(index).ok_or_else(|| {
            RegistrationError::invalid_configuration(format!("peak {} is not selected", index))
        })?;
        let phase = fit_phase(&self.histogram, &peak, fit_radius, &self.fit_config)?;
        self.selected[slot].1 = phase;
        Ok(&self.selected[slot].1)
    }

    /// Remove peak `index` from the selection. Returns whether it was selected.
    pub fn deselect(&mut self, index: usize) -> bool {
        match self.slot(index) {
            Some(slot) => {
                self.selected.remove(slot);
                true
            }
            None => false,
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.slot(index).is_some()
    }

    /// Selected phases in selection order.
    pub fn phases(&self) -> Vec<GaussianPhase> {
        self.selected.iter().map(|(_, phase)| *phase).collect()
    }

    /// Select every detected peak whose fit succeeds, with the default radius.
    ///
    /// Returns the indices of the peaks that could not be fitted.
    pub fn select_all(&mut self) -> Vec<usize> {
        let mut rejected = Vec::new();
        for index in 0..self.peaks.len() {
            if let Err(err) = self.select(index, None) {
                tracing::warn!("peak {} not selected: {}", index, err);
                rejected.push(index);
            }
        }
        rejected
    }

    fn peak(&self, index: usize) -> Result<Peak> {
        self.peaks.get(index).copied().ok_or_else(|| {
            RegistrationError::invalid_configuration(format!(
                "peak index {} out of range ({} peaks)",
                index,
                self.peaks.len()
            ))
        })
    }

    fn slot(&self, index: usize) -> Option<usize> {
        self.selected.iter().position(|(i, _)| *i == index)
    }
}
