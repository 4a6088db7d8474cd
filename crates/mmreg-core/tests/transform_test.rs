use mmreg_core::transform::{compose, decompose, TransformParameters};
use mmreg_core::Phi;
use nalgebra::Matrix4;
use proptest::prelude::*;

fn params_strategy() -> impl Strategy<Value = TransformParameters> {
    (
        prop::array::uniform3(-10.0f64..10.0),
        prop::array::uniform3(-1.5f64..1.5),
        prop::array::uniform3(0.5f64..2.0),
    )
        .prop_map(|(t, r, z)| TransformParameters { t, r, z })
}

proptest! {
    #[test]
    fn prop_compose_decompose_round_trip(params in params_strategy()) {
        let phi = compose(&params);
        let d = decompose(&phi).unwrap();
        let got = d.parameters;
        for i in 0..3 {
            prop_assert!((got.t[i] - params.t[i]).abs() < 1e-6, "t {:?} vs {:?}", got.t, params.t);
            prop_assert!((got.r[i] - params.r[i]).abs() < 1e-6, "r {:?} vs {:?}", got.r, params.r);
            prop_assert!((got.z[i] - params.z[i]).abs() < 1e-6, "z {:?} vs {:?}", got.z, params.z);
        }
    }

    #[test]
    fn prop_inverse_times_phi_is_identity(params in params_strategy()) {
        let phi = compose(&params);
        let inv = phi.inverse().unwrap();
        let product = inv.matrix() * phi.matrix();
        prop_assert!((product - Matrix4::identity()).norm() < 1e-9);
        let product = phi.matrix() * inv.matrix();
        prop_assert!((product - Matrix4::identity()).norm() < 1e-9);
    }

    #[test]
    fn prop_recompose_reproduces_phi(params in params_strategy()) {
        let phi = compose(&params);
        let again = decompose(&phi).unwrap().parameters.compose();
        prop_assert!((phi.matrix() - again.matrix()).norm() < 1e-9);
    }
}

#[test]
fn test_stretch_of_rotated_zoom_is_diagonal() {
    let params = TransformParameters {
        t: [1.0, 2.0, 3.0],
        r: [0.3, -0.2, 0.1],
        z: [1.2, 0.9, 1.05],
    };
    let d = decompose(&compose(&params)).unwrap();
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { params.z[i] } else { 0.0 };
            assert!((d.stretch[(i, j)] - expected).abs() < 1e-9);
        }
    }
    assert!((d.rotation.determinant() - 1.0).abs() < 1e-12);
}

#[test]
fn test_swap_roles_with_inverse() {
    let phi = compose(&TransformParameters {
        t: [0.5, -1.0, 2.0],
        r: [0.0, 0.1, 0.0],
        z: [1.0, 1.0, 1.0],
    });
    let p = [3.0, -4.0, 1.5];
    let q = phi.apply(p);
    let back = phi.inverse().unwrap().apply(q);
    for i in 0..3 {
        assert!((back[i] - p[i]).abs() < 1e-12);
    }
    assert_eq!(Phi::identity().inverse().unwrap(), Phi::identity());
}
