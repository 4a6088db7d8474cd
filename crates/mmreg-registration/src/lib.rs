//! Gaussian-mixture phase model and Gauss-Newton multimodal registration.
//!
//! The joint histogram of two co-located volumes is modelled as a set of
//! Gaussian phases. The phases partition the histogram into a
//! [`PhaseDiagram`], and the registration engine estimates the affine Phi
//! that maximises the likelihood of the moving volume under that model.

pub mod config;
pub mod engine;
pub mod error;
pub mod histogram;
pub mod phase;
pub mod progress;
pub mod synthetic;
pub mod tsv;
pub mod validation;

pub use config::{FitConfig, PeakSearchConfig, RegistrationConfig, SUPPORTED_BINS};
pub use engine::{
    registration_loop, RegistrationResult, RegistrationSession, RegistrationStatus, SessionState,
};
pub use error::{RegistrationError, Result};
pub use histogram::JointHistogram;
pub use phase::{
    distance, find_local_maxima, fit_ellipse, DistanceMode, GaussianMixture, GaussianPhase, Peak,
    PhaseDiagram,
};
pub use progress::{
    CancellationToken, ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
pub use tsv::{PhiRecord, TSV_HEADER};
pub use validation::ConvergenceChecker;
