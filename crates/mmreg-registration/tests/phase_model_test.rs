use mmreg_core::{IntensityScale, Volume};
use mmreg_registration::phase::fit_phase;
use mmreg_registration::{
    find_local_maxima, DistanceMode, FitConfig, GaussianMixture, GaussianPhase, JointHistogram,
    PeakSearchConfig, PhaseDiagram, RegistrationError,
};
use proptest::prelude::*;

fn gaussian_counts(bins: usize, blobs: &[(f64, f64, f64, [f64; 3])]) -> JointHistogram {
    let mut counts = vec![0.0; bins * bins];
    for row in 0..bins {
        for col in 0..bins {
            counts[row * bins + col] = blobs
                .iter()
                .map(|&(r, c, h, [a, b, cc])| {
                    let (dx, dy) = (row as f64 - r, col as f64 - c);
                    h * (-0.5 * (a * dx * dx + 2.0 * b * dx * dy + cc * dy * dy)).exp()
                })
                .sum();
        }
    }
    JointHistogram::from_counts(bins, counts).unwrap()
}

#[test]
fn test_mixture_recovers_tight_phases() {
    let hist = gaussian_counts(
        64,
        &[
            (20.0, 30.0, 1.0, [0.3, 0.05, 0.2]),
            (48.0, 12.0, 0.5, [0.5, -0.1, 0.4]),
        ],
    );
    let mut mixture = GaussianMixture::new(hist, PeakSearchConfig::for_bins(64));
    assert_eq!(mixture.peaks().len(), 2);
    assert!(mixture.select_all().is_empty());
    let phases = mixture.phases();
    assert_eq!((phases[0].x, phases[0].y), (20.5, 30.5));
    assert_eq!((phases[1].x, phases[1].y), (48.5, 12.5));
    for phase in &phases {
        assert!(phase.is_positive_definite());
        assert!(phase.fitted);
    }
}

#[test]
fn test_refit_replaces_previous_fit() {
    let hist = gaussian_counts(64, &[(20.0, 30.0, 1.0, [0.3, 0.05, 0.2])]);
    let mut mixture = GaussianMixture::new(hist, PeakSearchConfig::for_bins(64));
    let wide = *mixture.select(0, Some(12.8)).unwrap();
    let narrow = *mixture.refit(0, 4.0).unwrap();
    let direct = fit_phase(
        mixture.histogram(),
        &mixture.peaks()[0],
        4.0,
        &FitConfig::default(),
    )
    .unwrap();
    assert_eq!(narrow, direct);
    assert_ne!(narrow.fit_radius, wide.fit_radius);
    assert_eq!(mixture.phases(), vec![direct]);
}

#[test]
fn test_peaks_are_deterministic_on_volumes() {
    let scale = IntensityScale::new(0.0, 1.0, 64).unwrap();
    let a = Volume::from_fn([12, 12, 12], |z, y, x| ((z * 7 + y * 3 + x) % 5) as f64 / 4.0);
    let b = Volume::from_fn([12, 12, 12], |z, y, x| ((z + y * 5 + x * 2) % 3) as f64 / 2.0);
    let hist = JointHistogram::build_with_scales(&a, &b, &scale, &scale).unwrap();
    let first = find_local_maxima(&hist, 3, 10);
    let second = find_local_maxima(&hist, 3, 10);
    assert_eq!(first, second);
    assert!(!first.is_empty());
    for pair in first.windows(2) {
        assert!(pair[0].mass >= pair[1].mass);
    }
}

#[test]
fn test_full_coverage_of_fitted_mixture() {
    let hist = gaussian_counts(
        64,
        &[
            (20.0, 30.0, 1.0, [0.3, 0.05, 0.2]),
            (48.0, 12.0, 0.5, [0.5, -0.1, 0.4]),
        ],
    );
    let mut mixture = GaussianMixture::new(hist.clone(), PeakSearchConfig::for_bins(64));
    mixture.select_all();
    for mode in [DistanceMode::MaxDistance, DistanceMode::Mahalanobis] {
        let diagram = PhaseDiagram::find_full_coverage(&hist, &mixture.phases(), mode).unwrap();
        assert!(diagram.coverage() >= 0.999);
        assert_eq!(diagram.get(20, 30), 1);
        assert_eq!(diagram.get(48, 12), 2);
    }
}

#[test]
fn test_full_coverage_without_usable_phase() {
    let hist = gaussian_counts(64, &[(20.0, 30.0, 1.0, [0.3, 0.05, 0.2])]);
    let broken = GaussianPhase::new(20.5, 30.5, 0.1, 1.0, 3.0, 1.0);
    let result = PhaseDiagram::find_full_coverage(&hist, &[broken], DistanceMode::MaxDistance);
    assert!(matches!(result, Err(RegistrationError::DegenerateFit(_))));
}

fn phase_strategy() -> impl Strategy<Value = GaussianPhase> {
    (
        0.0f64..64.0,
        0.0f64..64.0,
        0.01f64..1.0,
        0.01f64..1.0,
        -0.9f64..0.9,
        0.01f64..1.0,
    )
        .prop_map(|(x, y, z, a, rho, c)| {
            // |b| < sqrt(a·c) keeps the form positive definite
            GaussianPhase::new(x, y, z, a, rho * (a * c).sqrt(), c)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_coverage_is_monotonic_in_sigma(
        phases in prop::collection::vec(phase_strategy(), 1..4),
        low in 0.0f64..50.0,
        extra in 0.0f64..50.0,
        mahalanobis in any::<bool>(),
    ) {
        let hist = gaussian_counts(64, &[(32.0, 32.0, 1.0, [0.01, 0.0, 0.01])]);
        let mode = if mahalanobis { DistanceMode::Mahalanobis } else { DistanceMode::MaxDistance };
        let narrow = PhaseDiagram::classify(&hist, &phases, low, mode).unwrap();
        let wide = PhaseDiagram::classify(&hist, &phases, low + extra, mode).unwrap();
        prop_assert!(wide.coverage() >= narrow.coverage());
        for (n, w) in narrow.as_slice().iter().zip(wide.as_slice()) {
            if *n != 0 {
                prop_assert_eq!(n, w);
            }
        }
    }
}
