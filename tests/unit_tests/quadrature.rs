use hofem::quadrature::{gauss_legendre, gauss_lobatto_points, tensor_weights};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DVector;

fn lobatto(n: usize) -> DVector<f64> {
    DVector::from_vec(gauss_lobatto_points(n))
}

#[test]
fn gauss_legendre_integrates_polynomials_exactly() {
    for n in 1..=12 {
        let (weights, points) = gauss_legendre(n);
        assert_eq!(weights.len(), n);
        assert_eq!(points.len(), n);
        for k in 0..2 * n {
            let integral: f64 = weights
                .iter()
                .zip(&points)
                .map(|(w, x)| w * x.powi(k as i32))
                .sum();
            assert_scalar_eq!(integral, 1.0 / (k as f64 + 1.0), comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn gauss_legendre_points_are_increasing_interior_and_symmetric() {
    for n in 1..=12 {
        let (weights, points) = gauss_legendre(n);
        assert!(points.windows(2).all(|w| w[0] < w[1]));
        assert!(points.iter().all(|&x| x > 0.0 && x < 1.0));
        assert!(weights.iter().all(|&w| w > 0.0));
        for i in 0..n {
            assert_scalar_eq!(points[i], 1.0 - points[n - 1 - i], comp = abs, tol = 1e-15);
            assert_scalar_eq!(weights[i], weights[n - 1 - i], comp = abs, tol = 1e-15);
        }
    }
}

#[test]
fn gauss_lobatto_small_rules() {
    assert_eq!(gauss_lobatto_points(1), vec![0.5]);
    assert_matrix_eq!(lobatto(2), DVector::from_vec(vec![0.0, 1.0]), comp = abs, tol = 1e-15);
    assert_matrix_eq!(lobatto(3), DVector::from_vec(vec![0.0, 0.5, 1.0]), comp = abs, tol = 1e-15);

    // Interior nodes of the 4-point rule are (1 -+ 1/sqrt(5)) / 2
    let s = 0.5 / 5.0f64.sqrt();
    assert_matrix_eq!(
        lobatto(4),
        DVector::from_vec(vec![0.0, 0.5 - s, 0.5 + s, 1.0]),
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn gauss_lobatto_points_include_end_points() {
    for n in 2..=12 {
        let points = gauss_lobatto_points(n);
        assert_eq!(points.len(), n);
        assert_scalar_eq!(points[0], 0.0, comp = abs, tol = 1e-15);
        assert_scalar_eq!(points[n - 1], 1.0, comp = abs, tol = 1e-15);
        assert!(points.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
#[should_panic]
fn zero_points_panic() {
    gauss_legendre(0);
}

#[test]
fn tensor_weights_are_products_with_first_coordinate_fastest() {
    let (w, _) = gauss_legendre(3);
    let w2 = tensor_weights(2, 3);
    assert_eq!(w2.len(), 9);
    for qy in 0..3 {
        for qx in 0..3 {
            assert_scalar_eq!(w2[qx + 3 * qy], w[qx] * w[qy], comp = abs, tol = 1e-15);
        }
    }

    let w3 = tensor_weights(3, 4);
    assert_eq!(w3.len(), 64);
    assert_scalar_eq!(w3.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-14);
}
