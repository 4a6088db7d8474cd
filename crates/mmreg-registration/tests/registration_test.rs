use std::sync::Arc;

use mmreg_core::{apply_phi, IntensityScale, Phi, Volume};
use mmreg_registration::synthetic::{generate_two_phase_scene, TwoPhaseScene, TwoPhaseSceneConfig};
use mmreg_registration::{
    registration_loop, CancellationToken, DistanceMode, GaussianMixture, GaussianPhase,
    HistoryCallback, JointHistogram, PeakSearchConfig, PhaseDiagram, PhiRecord, ProgressCallback,
    ProgressInfo, ProgressTracker, RegistrationConfig, RegistrationError, RegistrationSession,
    RegistrationStatus,
};

const BINS: usize = 64;
const N: usize = 24;

fn textured(shape: [usize; 3]) -> Volume<f64> {
    Volume::from_fn(shape, |z, y, x| {
        let (z, y, x) = (z as f64, y as f64, x as f64);
        0.5 + 0.2 * (0.5 * z + 0.3 * y).sin()
            + 0.15 * (0.4 * y - 0.35 * x + 0.2 * z).cos()
            + 0.1 * (0.45 * x + 0.25 * z).sin()
    })
}

struct Scenario {
    reference: Volume<f64>,
    moving: Volume<f64>,
    scales: [IntensityScale; 2],
    phases: Vec<GaussianPhase>,
    diagram: PhaseDiagram,
    truth: Phi,
}

/// Moving volume is the reference shifted by one voxel along z; both
/// phases penalise `f ≠ g`.
fn scenario() -> Scenario {
    let scale = IntensityScale::new(0.0, 1.0, BINS).unwrap();
    let reference = textured([N, N, N]);
    let truth = Phi::from_translation([1.0, 0.0, 0.0]);
    let moving = apply_phi(&reference, &truth).unwrap();

    let c = 0.01;
    let phases: Vec<GaussianPhase> = [BINS as f64 / 3.0, 2.0 * BINS as f64 / 3.0]
        .iter()
        .map(|&centre| GaussianPhase::new(centre, centre, 1.0, 1.05 * c, -c, c))
        .collect();
    let hist = JointHistogram::build_with_scales(&reference, &moving, &scale, &scale).unwrap();
    let diagram = PhaseDiagram::classify(&hist, &phases, 1e9, DistanceMode::MaxDistance).unwrap();
    Scenario {
        reference,
        moving,
        scales: [scale, scale],
        phases,
        diagram,
        truth,
    }
}

fn config() -> RegistrationConfig {
    RegistrationConfig::new()
        .with_margin(4)
        .with_max_iterations(10)
        .with_delta_phi_min(1e-3)
        .with_bins(BINS)
}

#[test]
fn test_recovers_translation() {
    let s = scenario();
    let result = registration_loop(
        &s.reference,
        &s.moving,
        &s.scales,
        Phi::identity(),
        &s.diagram,
        &s.phases,
        config(),
    )
    .unwrap();

    assert_eq!(result.status, RegistrationStatus::Converged);
    assert_eq!(result.return_status(), 2);
    assert!(result.error.is_none());
    assert!(result.iterations >= 2 && result.iterations <= 10);
    assert!(result.delta_phi_norm < 1e-3);
    for (got, want) in result.phi.affine_block().iter().zip(s.truth.affine_block()) {
        assert!((got - want).abs() < 1e-2, "{:?}", result.phi.affine_block());
    }
    assert!(result.phi.inverse().is_ok());
    assert!(result.log_likelihood.is_finite());
}

#[test]
fn test_converged_phi_is_a_fixed_point() {
    let s = scenario();
    let first = registration_loop(
        &s.reference,
        &s.moving,
        &s.scales,
        Phi::identity(),
        &s.diagram,
        &s.phases,
        config(),
    )
    .unwrap();
    let again = registration_loop(
        &s.reference,
        &s.moving,
        &s.scales,
        first.phi,
        &s.diagram,
        &s.phases,
        config(),
    )
    .unwrap();
    assert_eq!(again.status, RegistrationStatus::Converged);
    assert_eq!(again.iterations, 2);
    assert!(again.delta_phi_norm < 1e-3);
}

#[test]
fn test_empty_diagram_fails_with_seed() {
    let s = scenario();
    let empty = PhaseDiagram::from_table(BINS, vec![0; BINS * BINS]).unwrap();
    let seed = Phi::from_translation([0.5, 0.0, 0.0]);
    let result =
        registration_loop(&s.reference, &s.moving, &s.scales, seed, &empty, &s.phases, config())
            .unwrap();
    assert_eq!(result.status, RegistrationStatus::Failed);
    assert_eq!(result.return_status(), -1);
    assert_eq!(result.error, Some(RegistrationError::SingularSystem { iteration: 1 }));
    assert_eq!(result.phi, seed);
    assert_eq!(result.iterations, 0);
    assert_eq!(result.residual_field.shape(), [N - 8, N - 8, N - 8]);
}

#[test]
fn test_field_shapes_follow_margin() {
    let s = scenario();
    for margin in [0, 3, 5] {
        let config = config().with_margin(margin).with_max_iterations(1);
        let result = registration_loop(
            &s.reference,
            &s.moving,
            &s.scales,
            Phi::identity(),
            &s.diagram,
            &s.phases,
            config,
        )
        .unwrap();
        let side = N - 2 * margin;
        assert_eq!(result.residual_field.shape(), [side, side, side]);
        assert_eq!(result.phase_field.shape(), [side, side, side]);
        assert_eq!(result.status, RegistrationStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 1);
    }
}

#[test]
fn test_margin_too_wide_is_rejected() {
    let s = scenario();
    let result = registration_loop(
        &s.reference,
        &s.moving,
        &s.scales,
        Phi::identity(),
        &s.diagram,
        &s.phases,
        config().with_margin(N / 2),
    );
    assert!(matches!(result, Err(RegistrationError::InvalidConfiguration(_))));
}

#[test]
fn test_cancelled_before_start() {
    let s = scenario();
    let token = CancellationToken::new();
    token.cancel();
    let result = RegistrationSession::new(
        &s.reference,
        &s.moving,
        &s.scales,
        &s.diagram,
        &s.phases,
        Phi::identity(),
        config(),
    )
    .unwrap()
    .with_cancellation(token)
    .run();
    assert_eq!(result.status, RegistrationStatus::Cancelled);
    assert_eq!(result.return_status(), 0);
    assert_eq!(result.iterations, 0);
    assert_eq!(result.phi, Phi::identity());
}

/// Cancels its token once the given iteration has been reported.
struct CancelAt {
    iteration: usize,
    token: CancellationToken,
}

impl ProgressCallback for CancelAt {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration == self.iteration {
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancelled_between_iterations() {
    let s = scenario();
    let token = CancellationToken::new();
    let history = Arc::new(HistoryCallback::new());
    let progress = ProgressTracker::new()
        .with_callback(history.clone())
        .with_callback(Arc::new(CancelAt {
            iteration: 1,
            token: token.clone(),
        }));
    let result = RegistrationSession::new(
        &s.reference,
        &s.moving,
        &s.scales,
        &s.diagram,
        &s.phases,
        Phi::identity(),
        config(),
    )
    .unwrap()
    .with_progress(progress)
    .with_cancellation(token)
    .run();

    assert_eq!(result.status, RegistrationStatus::Cancelled);
    assert_eq!(result.iterations, 1);
    assert_ne!(result.phi, Phi::identity());
    let reports = history.get_history();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].delta_phi_norm, result.delta_phi_norm);
    assert!(reports[0].translation.is_some());
}

#[test]
fn test_progress_reports_every_iteration() {
    let s = scenario();
    let history = Arc::new(HistoryCallback::new());
    let result = RegistrationSession::new(
        &s.reference,
        &s.moving,
        &s.scales,
        &s.diagram,
        &s.phases,
        Phi::identity(),
        config(),
    )
    .unwrap()
    .with_progress(ProgressTracker::new().with_callback(history.clone()))
    .run();
    let reports = history.get_history();
    assert_eq!(reports.len(), result.iterations);
    for (k, info) in reports.iter().enumerate() {
        assert_eq!(info.iteration, k + 1);
        assert_eq!(info.max_iterations, 10);
    }
}

#[test]
fn test_record_of_result() {
    let s = scenario();
    let result = registration_loop(
        &s.reference,
        &s.moving,
        &s.scales,
        Phi::identity(),
        &s.diagram,
        &s.phases,
        config(),
    )
    .unwrap();
    let record = PhiRecord::from_result(&result, s.reference.shape(), 1);
    assert_eq!(record.centre, [11.5, 11.5, 11.5]);
    assert_eq!(record.return_status, 2);
    assert_eq!(record.iterations, result.iterations);

    let parsed = PhiRecord::parse_tsv(&record.to_tsv()).unwrap();
    for (got, want) in parsed.phi().affine_block().iter().zip(result.phi.affine_block()) {
        assert!((got - want).abs() < 1e-7);
    }
}

/// Moving modality of `scene` shifted one voxel along z, registered from the
/// identity with phases fitted on the joint histogram of the unaligned pair.
fn register_scene(scene: &TwoPhaseScene, mode: DistanceMode) -> (RegistrationStatus, Phi) {
    let scale = TwoPhaseScene::scale(BINS).unwrap();
    let moving = scene.deformed(&Phi::from_translation([1.0, 0.0, 0.0])).unwrap();
    let hist =
        JointHistogram::build_with_scales(&scene.reference, &moving, &scale, &scale).unwrap();

    let search = PeakSearchConfig {
        min_distance: 10,
        max_peaks: 2,
    };
    let mut mixture = GaussianMixture::new(hist.clone(), search);
    assert_eq!(mixture.peaks().len(), 2);
    assert!(mixture.select_all().is_empty());
    let phases = mixture.phases();
    let diagram = PhaseDiagram::find_full_coverage(&hist, &phases, mode).unwrap();

    let result = registration_loop(
        &scene.reference,
        &moving,
        &[scale, scale],
        Phi::identity(),
        &diagram,
        &phases,
        config(),
    )
    .unwrap();
    (result.status, result.phi)
}

fn assert_recovers_shift(status: RegistrationStatus, phi: &Phi) {
    assert_eq!(status, RegistrationStatus::Converged);
    let truth = Phi::from_translation([1.0, 0.0, 0.0]);
    for (got, want) in phi.affine_block().iter().zip(truth.affine_block()) {
        assert!((got - want).abs() < 1e-2, "{:?}", phi.affine_block());
    }
}

#[test]
fn test_fitted_phases_recover_translation() {
    let scene = generate_two_phase_scene(&TwoPhaseSceneConfig::default());
    for mode in [DistanceMode::MaxDistance, DistanceMode::Mahalanobis] {
        let (status, phi) = register_scene(&scene, mode);
        assert_recovers_shift(status, &phi);
    }
}

#[test]
fn test_fitted_phases_recover_translation_under_inverted_contrast() {
    let scene = generate_two_phase_scene(&TwoPhaseSceneConfig {
        inverted: true,
        ..Default::default()
    });
    for mode in [DistanceMode::MaxDistance, DistanceMode::Mahalanobis] {
        let (status, phi) = register_scene(&scene, mode);
        assert_recovers_shift(status, &phi);
    }
}

#[test]
fn test_fitted_phases_recover_translation_with_noise() {
    let scene = generate_two_phase_scene(&TwoPhaseSceneConfig {
        noise_sigma: 0.01,
        seed: 7,
        ..Default::default()
    });
    let (status, phi) = register_scene(&scene, DistanceMode::MaxDistance);
    assert_recovers_shift(status, &phi);
}
