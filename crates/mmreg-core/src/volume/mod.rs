//! Volume types and intensity scaling.

pub mod volume;
pub mod intensity;

pub use volume::{centre_of, cropped_shape, Volume};
pub use intensity::IntensityScale;
