//! Gaussian mixture model of the joint histogram.
//!
//! Peaks of the histogram are detected, a subset is fitted with Gaussian
//! ellipses, and the fitted phases partition the histogram plane into the
//! [`PhaseDiagram`] consumed by the registration engine.

pub mod diagram;
pub mod fit;
pub mod gaussian;
pub mod lm;
pub mod mixture;
pub mod peaks;

pub use diagram::{distance, DistanceMode, PhaseDiagram, FULL_COVERAGE, MAX_COVERAGE_STEPS};
pub use fit::{fit_ellipse, fit_phase, EllipseFit};
pub use gaussian::{GaussianPhase, Peak};
pub use mixture::GaussianMixture;
pub use peaks::find_local_maxima;
