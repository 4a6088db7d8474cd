use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use mmreg_core::transform::decompose;
use mmreg_core::{IntensityScale, Phi, TransformParameters, Volume};
use mmreg_registration::synthetic::{generate_two_phase_scene, TwoPhaseScene, TwoPhaseSceneConfig};
use mmreg_registration::{
    ConsoleProgressCallback, DistanceMode, GaussianMixture, JointHistogram, PeakSearchConfig,
    PhaseDiagram, PhiRecord, ProgressTracker, RegistrationConfig, RegistrationSession,
};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer tasks for the mmreg workspace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a synthetic two-phase scene and print the TSV record
    Register {
        #[command(flatten)]
        pair: PairArgs,

        /// Voxels excluded along every face
        #[arg(long, default_value_t = 4)]
        margin: usize,

        /// Iteration limit
        #[arg(long, default_value_t = 10)]
        max_iterations: usize,

        /// Convergence threshold on the increment norm
        #[arg(long, default_value_t = 0.001)]
        delta_phi_min: f64,

        /// Distance used to build the phase diagram
        #[arg(long, value_enum, default_value_t = Mode::MaxDistance)]
        mode: Mode,

        /// Write the record here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the peaks and fitted phases of a synthetic scene as JSON
    Phases {
        #[command(flatten)]
        pair: PairArgs,
    },

    /// Decompose the Phi stored in a TSV record
    Decompose {
        /// TSV file written by `register`
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct PairArgs {
    /// Edge length of the cubic volumes
    #[arg(long, default_value_t = 32)]
    size: usize,

    /// Histogram bucket count (64, 128 or 256)
    #[arg(long, default_value_t = 64)]
    bins: usize,

    /// Translation (z, y, x) applied to the moving volume, in voxels
    #[arg(long, num_args = 3, value_delimiter = ',', default_values_t = [1.0, 0.0, 0.0])]
    translation: Vec<f64>,

    /// Rotation vector (z, y, x) applied to the moving volume, in radians
    #[arg(long, num_args = 3, value_delimiter = ',', default_values_t = [0.0, 0.0, 0.0])]
    rotation: Vec<f64>,

    /// Image the moving modality with inverted contrast
    #[arg(long)]
    invert: bool,

    /// Width of the ball boundary in voxels, 0 for a sharp step
    #[arg(long, default_value_t = 0.0)]
    edge_width: f64,

    /// Standard deviation of the noise added to each modality
    #[arg(long, default_value_t = 0.0)]
    noise: f64,

    /// Seed of the noise generator
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Minimum distance between histogram peaks, in bins
    #[arg(long, default_value_t = 10)]
    min_distance: usize,

    /// Number of histogram peaks fitted as phases
    #[arg(long, default_value_t = 2)]
    max_peaks: usize,
}

/// Reference and deformed moving modality with their shared grey limits.
struct SyntheticPair {
    reference: Volume<f64>,
    moving: Volume<f64>,
    scale: IntensityScale,
    truth: Phi,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    MaxDistance,
    Mahalanobis,
}

impl From<Mode> for DistanceMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::MaxDistance => DistanceMode::MaxDistance,
            Mode::Mahalanobis => DistanceMode::Mahalanobis,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register {
            pair,
            margin,
            max_iterations,
            delta_phi_min,
            mode,
            output,
        } => {
            let config = RegistrationConfig::new()
                .with_margin(margin)
                .with_max_iterations(max_iterations)
                .with_delta_phi_min(delta_phi_min)
                .with_bins(pair.bins);
            register(&pair, config, mode.into(), output)?;
        }
        Commands::Phases { pair } => {
            print_phases(&pair)?;
        }
        Commands::Decompose { path } => {
            print_decomposition(&path)?;
        }
    }

    Ok(())
}

fn vector3(values: &[f64], name: &str) -> Result<[f64; 3]> {
    values
        .try_into()
        .with_context(|| format!("{} needs three comma-separated values", name))
}

/// Two-phase scene with the moving modality deformed by the requested Phi.
fn synthetic_pair(pair: &PairArgs) -> Result<SyntheticPair> {
    let truth = TransformParameters {
        t: vector3(&pair.translation, "translation")?,
        r: vector3(&pair.rotation, "rotation")?,
        z: [1.0; 3],
    }
    .compose();

    let scene = generate_two_phase_scene(&TwoPhaseSceneConfig {
        size: pair.size,
        edge_width: pair.edge_width,
        noise_sigma: pair.noise,
        inverted: pair.invert,
        seed: pair.seed,
        ..Default::default()
    });
    let moving = scene.deformed(&truth)?;
    Ok(SyntheticPair {
        reference: scene.reference,
        moving,
        scale: TwoPhaseScene::scale(pair.bins)?,
        truth,
    })
}

fn phase_model(data: &SyntheticPair, pair: &PairArgs) -> Result<(JointHistogram, GaussianMixture)> {
    let hist =
        JointHistogram::build_with_scales(&data.reference, &data.moving, &data.scale, &data.scale)?;
    let search = PeakSearchConfig {
        min_distance: pair.min_distance,
        max_peaks: pair.max_peaks,
    };
    let mut mixture = GaussianMixture::new(hist.clone(), search);
    let rejected = mixture.select_all();
    if !rejected.is_empty() {
        warn!("{} peaks could not be fitted", rejected.len());
    }
    Ok((hist, mixture))
}

fn register(
    pair: &PairArgs,
    config: RegistrationConfig,
    mode: DistanceMode,
    output: Option<PathBuf>,
) -> Result<()> {
    let data = synthetic_pair(pair)?;
    let (hist, mixture) = phase_model(&data, pair)?;
    let phases = mixture.phases();
    let diagram = PhaseDiagram::find_full_coverage(&hist, &phases, mode)?;
    info!(
        "{} phases, sigma {} covers {:.4} of the joint histogram",
        phases.len(),
        diagram.sigma(),
        diagram.coverage()
    );

    let progress =
        ProgressTracker::new().with_callback(Arc::new(ConsoleProgressCallback::default()));
    let result = RegistrationSession::new(
        &data.reference,
        &data.moving,
        &[data.scale, data.scale],
        &diagram,
        &phases,
        Phi::identity(),
        config,
    )?
    .with_progress(progress)
    .run();
    if let Some(err) = &result.error {
        warn!("registration failed: {}", err);
    }
    let deviation = result
        .phi
        .affine_block()
        .iter()
        .zip(data.truth.affine_block())
        .fold(0.0f64, |acc, (got, want)| acc.max((got - want).abs()));
    eprintln!(
        "status {:?} after {} iterations, largest deviation from the applied Phi {:.2e}",
        result.status, result.iterations, deviation
    );

    let record = PhiRecord::from_result(&result, data.reference.shape(), 1);
    match output {
        Some(path) => {
            std::fs::write(&path, record.to_tsv())
                .with_context(|| format!("writing {}", path.display()))?;
            info!("record written to {}", path.display());
        }
        None => print!("{}", record.to_tsv()),
    }
    Ok(())
}

fn print_phases(pair: &PairArgs) -> Result<()> {
    let data = synthetic_pair(pair)?;
    let (_, mixture) = phase_model(&data, pair)?;
    let report = serde_json::json!({
        "peaks": mixture.peaks(),
        "phases": mixture.phases(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_decomposition(path: &Path) -> Result<()> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let record = PhiRecord::parse_tsv(&text)?;
    let decomposition = decompose(&record.phi())?;
    let p = decomposition.parameters;
    println!("t = [{:.5}, {:.5}, {:.5}]", p.t[0], p.t[1], p.t[2]);
    println!("r = [{:.5}, {:.5}, {:.5}]", p.r[0], p.r[1], p.r[2]);
    println!("z = [{:.5}, {:.5}, {:.5}]", p.z[0], p.z[1], p.z[2]);
    println!("volumetric change = {:.5}", decomposition.volumetric_change);
    println!(
        "return status {} after {} iterations",
        record.return_status, record.iterations
    );
    Ok(())
}
