//! Gauss-Newton registration session.
//!
//! A session moves through `Initialized → Iterating → Finished`. Each step
//! solves the normal equations built from the current deformed moving
//! volume, updates `Phi ← Phi · (I + ΔPhi)` and refreshes the deformed
//! volume, the diagnostic fields and the log-likelihood.

use serde::{Deserialize, Serialize};
use mmreg_core::transform::decompose;
use mmreg_core::{gradient, sample_under, IntensityScale, Phi, Volume};
use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::histogram::JointHistogram;
use crate::phase::{GaussianPhase, PhaseDiagram};
use crate::progress::{CancellationToken, ProgressInfo, ProgressTracker};
use crate::validation::{validate_volume_shapes, ConvergenceChecker};
use super::operators::{accumulate, diagnostic_fields, DiagnosticFields};

/// How a registration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// `‖Δ‖` fell below the threshold.
    Converged,
    /// The iteration limit was reached first.
    MaxIterationsReached,
    /// The cancellation token was set.
    Cancelled,
    /// The normal equations could not be solved.
    Failed,
}

impl RegistrationStatus {
    /// Numeric `returnStatus`: `2`, `1`, `0` and `-1` in declaration order.
    pub fn code(&self) -> i32 {
        match self {
            RegistrationStatus::Converged => 2,
            RegistrationStatus::MaxIterationsReached => 1,
            RegistrationStatus::Cancelled => 0,
            RegistrationStatus::Failed => -1,
        }
    }

    /// Status of a numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            2 => Some(RegistrationStatus::Converged),
            1 => Some(RegistrationStatus::MaxIterationsReached),
            0 => Some(RegistrationStatus::Cancelled),
            -1 => Some(RegistrationStatus::Failed),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RegistrationStatus::Converged)
    }
}

/// Lifecycle of a [`RegistrationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    Iterating,
    Finished(RegistrationStatus),
}

/// Outcome of a registration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// Last valid Phi.
    pub phi: Phi,
    pub status: RegistrationStatus,
    /// Cause of a [`RegistrationStatus::Failed`] run.
    pub error: Option<RegistrationError>,
    /// Completed iterations, never more than the configured limit.
    pub iterations: usize,
    /// `‖Δ‖` of the last completed iteration, `NaN` before the first.
    pub delta_phi_norm: f64,
    /// Residual field over the margin-cropped interior.
    pub residual_field: Volume<f64>,
    /// Phase field over the margin-cropped interior.
    pub phase_field: Volume<u8>,
    /// Log-likelihood under the final Phi.
    pub log_likelihood: f64,
    /// Log-likelihood under the seed Phi.
    pub initial_log_likelihood: f64,
}

impl RegistrationResult {
    /// Numeric `returnStatus` of the run.
    pub fn return_status(&self) -> i32 {
        self.status.code()
    }
}

/// One registration run over a frozen phase model.
///
/// The session holds both volumes in bin units, converted on creation with
/// the grey limits of each modality.
pub struct RegistrationSession<'a> {
    reference: Volume<f64>,
    moving: Volume<f64>,
    diagram: &'a PhaseDiagram,
    phases: &'a [GaussianPhase],
    config: RegistrationConfig,
    convergence: ConvergenceChecker,
    progress: ProgressTracker,
    cancellation: Option<CancellationToken>,

    state: SessionState,
    phi: Phi,
    iterations: usize,
    delta_phi_norm: f64,
    deformed: Volume<f64>,
    fields: DiagnosticFields,
    log_likelihood: f64,
    initial_log_likelihood: f64,
    error: Option<RegistrationError>,
}

impl<'a> RegistrationSession<'a> {
    /// Validate the inputs and evaluate the seed transform.
    ///
    /// `scales` holds the grey limits of the reference and moving volumes,
    /// both with `config.bins` buckets.
    pub fn new(
        reference: &Volume<f64>,
        moving: &Volume<f64>,
        scales: &[IntensityScale; 2],
        diagram: &'a PhaseDiagram,
        phases: &'a [GaussianPhase],
        initial_phi: Phi,
        config: RegistrationConfig,
    ) -> Result<Self> {
        validate_volume_shapes(reference, moving)?;
        config.validate_for_shape(reference.shape())?;
        if let Some(scale) = scales.iter().find(|s| s.bins() != config.bins) {
            return Err(RegistrationError::invalid_configuration(format!(
                "intensity scale has {} bins, expected {}",
                scale.bins(),
                config.bins
            )));
        }
        if diagram.bins() != config.bins {
            return Err(RegistrationError::shape_mismatch(
                &[config.bins, config.bins],
                &[diagram.bins(), diagram.bins()],
            ));
        }
        if !initial_phi.is_finite() || initial_phi.inverse().is_err() {
            return Err(RegistrationError::invalid_configuration(
                "initial Phi must be finite and invertible",
            ));
        }

        let reference = scales[0].volume_to_bin_units(reference);
        let moving = scales[1].volume_to_bin_units(moving);
        let deformed = sample_under(&moving, &initial_phi);
        let fields = diagnostic_fields(&reference, &deformed, diagram, phases, config.margin);
        let log_likelihood = log_likelihood(&reference, &deformed, &config)?;

        Ok(Self {
            reference,
            moving,
            diagram,
            phases,
            convergence: ConvergenceChecker::new(config.delta_phi_min, config.min_iterations()),
            config,
            progress: ProgressTracker::new(),
            cancellation: None,
            state: SessionState::Initialized,
            phi: initial_phi,
            iterations: 0,
            delta_phi_norm: f64::NAN,
            deformed,
            fields,
            log_likelihood,
            initial_log_likelihood: log_likelihood,
            error: None,
        })
    }

    /// Report iterations to `progress`.
    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// Stop at the next iteration boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phi(&self) -> &Phi {
        &self.phi
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Run one iteration, or finish if cancellation was requested.
    ///
    /// Does nothing once the session has finished.
    pub fn step(&mut self) -> SessionState {
        if let SessionState::Finished(_) = self.state {
            return self.state;
        }
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            tracing::info!("registration cancelled after {} iterations", self.iterations);
            self.state = SessionState::Finished(RegistrationStatus::Cancelled);
            return self.state;
        }
        self.state = SessionState::Iterating;

        let iteration = self.iterations + 1;
        let grad = gradient(&self.deformed);
        let operators = accumulate(
            &self.reference,
            &self.deformed,
            &grad,
            self.diagram,
            self.phases,
            self.config.margin,
        );
        let next = operators
            .solve()
            .map(|delta| (self.phi.increment(&delta), delta.norm()))
            .filter(|(phi, _)| phi.is_finite() && phi.inverse().is_ok());
        let Some((phi, norm)) = next else {
            tracing::error!(
                "singular system at iteration {} ({} contributing voxels)",
                iteration,
                operators.voxels
            );
            return self.fail(RegistrationError::SingularSystem { iteration });
        };

        self.phi = phi;
        self.iterations = iteration;
        self.delta_phi_norm = norm;
        if let Err(err) = self.refresh() {
            return self.fail(err);
        }
        self.report();

        if self.convergence.check_convergence(self.iterations, norm) {
            self.state = SessionState::Finished(RegistrationStatus::Converged);
        } else if self.iterations >= self.config.max_iterations {
            self.state = SessionState::Finished(RegistrationStatus::MaxIterationsReached);
        }
        self.state
    }

    /// Iterate until the session finishes.
    pub fn run(mut self) -> RegistrationResult {
        self.progress.start();
        while !matches!(self.state, SessionState::Finished(_)) {
            self.step();
        }
        let info = self.progress_info();
        match (&self.error, self.state) {
            (Some(err), _) => self.progress.error(&err.to_string()),
            (None, SessionState::Finished(RegistrationStatus::Cancelled)) => {
                self.progress.error("cancelled")
            }
            _ => self.progress.complete(&info),
        }
        self.into_result()
    }

    /// Result of the session in its current state.
    pub fn into_result(self) -> RegistrationResult {
        let status = match self.state {
            SessionState::Finished(status) => status,
            _ => RegistrationStatus::Cancelled,
        };
        RegistrationResult {
            phi: self.phi,
            status,
            error: self.error,
            iterations: self.iterations,
            delta_phi_norm: self.delta_phi_norm,
            residual_field: self.fields.residual,
            phase_field: self.fields.phase,
            log_likelihood: self.log_likelihood,
            initial_log_likelihood: self.initial_log_likelihood,
        }
    }

    fn fail(&mut self, error: RegistrationError) -> SessionState {
        self.error = Some(error);
        self.state = SessionState::Finished(RegistrationStatus::Failed);
        self.state
    }

    fn refresh(&mut self) -> Result<()> {
        self.deformed = sample_under(&self.moving, &self.phi);
        self.fields = diagnostic_fields(
            &self.reference,
            &self.deformed,
            self.diagram,
            self.phases,
            self.config.margin,
        );
        self.log_likelihood = log_likelihood(&self.reference, &self.deformed, &self.config)?;
        Ok(())
    }

    fn progress_info(&self) -> ProgressInfo {
        let info = ProgressInfo::new(
            self.iterations,
            self.config.max_iterations,
            self.delta_phi_norm,
            self.log_likelihood,
            self.progress.elapsed(),
        );
        match decompose(&self.phi) {
            Ok(d) => info.with_parameters(d.parameters.t, d.parameters.r, d.parameters.z),
            Err(_) => info,
        }
    }

    fn report(&self) {
        let info = self.progress_info();
        match (info.translation, info.rotation, info.zoom) {
            (Some(t), Some(r), Some(z)) => tracing::info!(
                "iteration {}: logLikelihood {:.3}, dPhiNorm {:.5}, t {:.3?}, r {:.4?}, z {:.4?}",
                info.iteration,
                info.log_likelihood,
                info.delta_phi_norm,
                t,
                r,
                z
            ),
            _ => tracing::info!(
                "iteration {}: logLikelihood {:.3}, dPhiNorm {:.5}",
                info.iteration,
                info.log_likelihood,
                info.delta_phi_norm
            ),
        }
        self.progress.update(&info);
    }
}

/// `Σ ln(count)` of the joint histogram of the cropped interiors.
fn log_likelihood(
    reference: &Volume<f64>,
    deformed: &Volume<f64>,
    config: &RegistrationConfig,
) -> Result<f64> {
    let hist = JointHistogram::from_bin_units(
        &reference.crop_margin(config.margin),
        &deformed.crop_margin(config.margin),
        config.bins,
    )?;
    Ok(hist.log_likelihood())
}

/// Register `moving` onto `reference` starting from `initial_phi`.
///
/// Both volumes hold raw intensities; `scales` maps each onto the bucket axis
/// of `diagram`. Invalid inputs are reported as errors; every other outcome,
/// including a singular system, is a [`RegistrationResult`] carrying the last
/// valid Phi.
pub fn registration_loop(
    reference: &Volume<f64>,
    moving: &Volume<f64>,
    scales: &[IntensityScale; 2],
    initial_phi: Phi,
    diagram: &PhaseDiagram,
    phases: &[GaussianPhase],
    config: RegistrationConfig,
) -> Result<RegistrationResult> {
    let session =
        RegistrationSession::new(reference, moving, scales, diagram, phases, initial_phi, config)?;
    Ok(session.run())
}
