//! Phase diagram: the joint-histogram plane partitioned among phases.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::error::{RegistrationError, Result};
use crate::histogram::{bin_of_units, JointHistogram};
use super::gaussian::GaussianPhase;

/// Mass fraction at which [`PhaseDiagram::find_full_coverage`] stops.
pub const FULL_COVERAGE: f64 = 0.999;

/// Upper bound on the number of thresholds tried by
/// [`PhaseDiagram::find_full_coverage`].
pub const MAX_COVERAGE_STEPS: usize = 1000;

/// Distance between a histogram bucket and a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMode {
    /// `q - ln z`: bucket goes to the most likely phase.
    #[default]
    MaxDistance,
    /// `sqrt(q)`.
    Mahalanobis,
}

/// Distance from bucket centre `(f, g)` to `phase`.
#[inline]
pub fn distance(f: f64, g: f64, phase: &GaussianPhase, mode: DistanceMode) -> f64 {
    let q = phase.quadratic_form(f, g);
    match mode {
        DistanceMode::MaxDistance => q - phase.z.ln(),
        DistanceMode::Mahalanobis => q.sqrt(),
    }
}

/// Whether `phase` can receive buckets under `mode`.
fn is_usable(phase: &GaussianPhase, mode: DistanceMode) -> bool {
    phase.is_positive_definite() && (mode == DistanceMode::Mahalanobis || phase.z > 0.0)
}

/// `bins × bins` table of phase ids, `0` meaning unclassified.
///
/// Rows are reference buckets, columns moving buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDiagram {
    bins: usize,
    table: Vec<u8>,
    sigma: f64,
    coverage: f64,
    mode: DistanceMode,
}

impl PhaseDiagram {
    /// Assign each bucket to its nearest phase when that distance is below `sigma`.
    ///
    /// Ids are the phase index plus one. Ties go to the lower index. Phases
    /// that are not positive definite, or that have no mass under
    /// [`DistanceMode::MaxDistance`], never receive buckets.
    pub fn classify(
        hist: &JointHistogram,
        phases: &[GaussianPhase],
        sigma: f64,
        mode: DistanceMode,
    ) -> Result<Self> {
        if phases.len() > u8::MAX as usize {
            return Err(RegistrationError::invalid_configuration(format!(
                "at most {} phases can be classified, got {}",
                u8::MAX,
                phases.len()
            )));
        }
        if sigma.is_nan() {
            return Err(RegistrationError::invalid_configuration("sigma is NaN"));
        }

        let usable: Vec<(u8, &GaussianPhase)> = phases
            .iter()
            .enumerate()
            .filter(|(_, p)| is_usable(p, mode))
            .map(|(i, p)| ((i + 1) as u8, p))
            .collect();
        if usable.len() < phases.len() {
            tracing::warn!(
                "{} of {} phases are degenerate and were skipped",
                phases.len() - usable.len(),
                phases.len()
            );
        }

        let bins = hist.bins();
        let mut table = vec![0u8; bins * bins];
        table.par_chunks_mut(bins).enumerate().for_each(|(row, cells)| {
            let f = row as f64 + 0.5;
            for (col, cell) in cells.iter_mut().enumerate() {
                let g = col as f64 + 0.5;
                let mut best: Option<(u8, f64)> = None;
                for &(id, phase) in &usable {
                    let d = distance(f, g, phase, mode);
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((id, d));
                    }
                }
                if let Some((id, d)) = best {
                    if d < sigma {
                        *cell = id;
                    }
                }
            }
        });

        let coverage: f64 = table
            .iter()
            .zip(hist.as_slice())
            .filter(|(id, _)| **id != 0)
            .map(|(_, m)| m)
            .sum();

        Ok(Self {
            bins,
            table,
            sigma,
            coverage,
            mode,
        })
    }

    /// Raise `sigma` from 1 until the classified mass reaches [`FULL_COVERAGE`].
    ///
    /// `sigma` is raised before each classification by a step that starts
    /// at 1 and is multiplied by ten each time `sigma` reaches ten times the
    /// step, so the thresholds tried are 2, 3, …, 10, 20, …, 100, 200, ….
    pub fn find_full_coverage(
        hist: &JointHistogram,
        phases: &[GaussianPhase],
        mode: DistanceMode,
    ) -> Result<Self> {
        if !phases.iter().any(|p| is_usable(p, mode)) {
            return Err(RegistrationError::degenerate_fit(
                "no usable phase to build a diagram from",
            ));
        }

        let mut sigma = 1.0;
        let mut step = 1.0;
        for _ in 0..MAX_COVERAGE_STEPS {
            sigma += step;
            if sigma >= 10.0 * step {
                step *= 10.0;
            }
            let diagram = Self::classify(hist, phases, sigma, mode)?;
            tracing::debug!("sigma {} covers {:.5} of the mass", sigma, diagram.coverage);
            if diagram.coverage >= FULL_COVERAGE {
                return Ok(diagram);
            }
        }
        Err(RegistrationError::degenerate_fit(format!(
            "coverage stayed below {} after {} thresholds",
            FULL_COVERAGE, MAX_COVERAGE_STEPS
        )))
    }

    /// Wrap an existing row-major table of phase ids.
    pub fn from_table(bins: usize, table: Vec<u8>) -> Result<Self> {
        if bins == 0 {
            return Err(RegistrationError::invalid_configuration("bins must be positive"));
        }
        if table.len() != bins * bins {
            return Err(RegistrationError::shape_mismatch(&[bins, bins], &[table.len()]));
        }
        Ok(Self {
            bins,
            table,
            sigma: f64::NAN,
            coverage: f64::NAN,
            mode: DistanceMode::default(),
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Phase id of bucket `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.table[row * self.bins + col]
    }

    /// Phase id of a pair of samples in bin units, `0` if either is `NaN`.
    #[inline]
    pub fn lookup(&self, f: f64, g: f64) -> u8 {
        match (bin_of_units(f, self.bins), bin_of_units(g, self.bins)) {
            (Some(row), Some(col)) => self.get(row, col),
            _ => 0,
        }
    }

    /// Threshold used to build the table, `NaN` for wrapped tables.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Histogram mass of classified buckets, `NaN` for wrapped tables.
    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    pub fn mode(&self) -> DistanceMode {
        self.mode
    }

    /// Phase ids, row-major.
    pub fn as_slice(&self) -> &[u8] {
        &self.table
    }

    /// Number of buckets assigned to phase `id`.
    pub fn area(&self, id: u8) -> usize {
        self.table.iter().filter(|v| **v == id).count()
    }
}
