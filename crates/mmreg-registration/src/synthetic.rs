//! Synthetic two-phase volume pairs with a known alignment.
//!
//! A scene is a textured matrix holding one textured ball, imaged by two
//! modalities. Both modalities see the same texture with different gains,
//! so every voxel pair sits on the ridge of one of two elongated Gaussian
//! blobs in the joint histogram. With a sharp ball boundary there are no
//! partial-volume pairs between the blobs and a phase model fitted on the
//! pair describes every voxel.
//!
//! ```rust,ignore
//! use mmreg_registration::synthetic::{generate_two_phase_scene, TwoPhaseSceneConfig};
//!
//! let scene = generate_two_phase_scene(&TwoPhaseSceneConfig {
//!     inverted: true,
//!     ..Default::default()
//! });
//! let moving = scene.deformed(&Phi::from_translation([1.0, 0.0, 0.0]))?;
//! ```

use crate::error::Result;
use mmreg_core::{apply_phi, IntensityScale, Phi, Volume};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Grey limits every scene intensity falls into.
pub const SCENE_GREY_LIMITS: (f64, f64) = (0.0, 1.0);

/// Parameters of a two-phase scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoPhaseSceneConfig {
    /// Edge length of the cubic volumes.
    pub size: usize,
    /// Peak amplitude of the shared texture in the reference modality.
    pub texture_amplitude: f64,
    /// Width of the ball boundary in voxels, `0` for a sharp step.
    pub edge_width: f64,
    /// Standard deviation of the independent noise added to each modality.
    pub noise_sigma: f64,
    /// Image the second modality with inverted contrast.
    pub inverted: bool,
    pub seed: u64,
}

impl Default for TwoPhaseSceneConfig {
    fn default() -> Self {
        Self {
            size: 32,
            texture_amplitude: 0.08,
            edge_width: 0.0,
            noise_sigma: 0.0,
            inverted: false,
            seed: 1,
        }
    }
}

/// Both modalities of a scene, aligned with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoPhaseScene {
    pub reference: Volume<f64>,
    /// Second modality before any transform is applied.
    pub moving: Volume<f64>,
}

impl TwoPhaseScene {
    /// Second modality deformed by `phi`, `out(x) = moving(phi⁻¹ · x)`.
    pub fn deformed(&self, phi: &Phi) -> Result<Volume<f64>> {
        Ok(apply_phi(&self.moving, phi)?)
    }

    /// Grey limits shared by both modalities.
    pub fn scale(bins: usize) -> Result<IntensityScale> {
        Ok(IntensityScale::new(SCENE_GREY_LIMITS.0, SCENE_GREY_LIMITS.1, bins)?)
    }
}

/// Smooth texture in `[-1, 1]`.
fn texture(z: f64, y: f64, x: f64) -> f64 {
    ((0.5 * z + 0.3 * y).sin()
        + (0.4 * y - 0.35 * x + 0.2 * z).cos()
        + (0.45 * x + 0.25 * z).sin())
        / 3.0
}

/// Ball occupancy in `[0, 1]`.
fn occupancy(distance: f64, edge_width: f64) -> f64 {
    if edge_width > 0.0 {
        1.0 / (1.0 + (distance / edge_width).exp())
    } else if distance < 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Zero-mean Gaussian samples, one per voxel, via Box-Muller.
fn gaussian_noise(len: usize, sigma: f64, rng: &mut StdRng) -> Vec<f64> {
    (0..len)
        .map(|_| {
            let u1: f64 = rng.random_range(1e-12..1.0);
            let u2: f64 = rng.random_range(0.0..1.0);
            sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
        })
        .collect()
}

/// Generate both modalities of a scene.
pub fn generate_two_phase_scene(config: &TwoPhaseSceneConfig) -> TwoPhaseScene {
    let shape = [config.size; 3];
    let c = (config.size as f64 - 1.0) / 2.0;
    let centre = [c + 1.3, c - 0.8, c + 0.6];
    let radius = 0.25 * config.size as f64;
    let amplitude = config.texture_amplitude;

    let sample = |z: usize, y: usize, x: usize| {
        let p = [z as f64, y as f64, x as f64];
        let distance = ((p[0] - centre[0]).powi(2)
            + (p[1] - centre[1]).powi(2)
            + (p[2] - centre[2]).powi(2))
        .sqrt()
            - radius;
        (occupancy(distance, config.edge_width), texture(p[0], p[1], p[2]))
    };

    let mut reference = Volume::from_fn(shape, |z, y, x| {
        let (s, t) = sample(z, y, x);
        0.3 + 0.4 * s + amplitude * t
    });
    let mut moving = Volume::from_fn(shape, |z, y, x| {
        let (s, t) = sample(z, y, x);
        if config.inverted {
            0.75 - 0.45 * s - 0.8 * amplitude * t
        } else {
            0.25 + 0.5 * s + 1.2 * amplitude * t
        }
    });

    if config.noise_sigma > 0.0 {
        let mut rng = StdRng::seed_from_u64(config.seed);
        for volume in [&mut reference, &mut moving] {
            let noise = gaussian_noise(volume.len(), config.noise_sigma, &mut rng);
            for (v, n) in volume.as_mut_slice().iter_mut().zip(noise) {
                *v += n;
            }
        }
    }

    TwoPhaseScene { reference, moving }
}
