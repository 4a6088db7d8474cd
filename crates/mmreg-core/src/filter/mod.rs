pub mod resample;
pub mod gradient;

pub use resample::{apply_phi, sample_under, ResampleFilter};
pub use gradient::{gradient, Gradient};
