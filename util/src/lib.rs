use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Approx assertion for slices, using a tolerance relative to the largest magnitude on the right.
#[macro_export]
macro_rules! assert_slices_rel_eq {
    ($x:expr, $y:expr, reltol = $tol:expr) => {{
        let x: &[f64] = &$x;
        let y: &[f64] = &$y;
        assert_eq!(x.len(), y.len(), "slices differ in length");

        let scale = y.iter().fold(1.0f64, |m, v| m.max(v.abs()));
        let max_absdiff = x
            .iter()
            .zip(y.iter())
            .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()));
        let approx_eq = max_absdiff <= $tol * scale;

        if !approx_eq {
            println!("reltol: {:e}", $tol);
            println!("left: {:?}", x);
            println!("right: {:?}", y);
            println!("max abs diff: {:e} (scale {:e})", max_absdiff, scale);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::{catch_unwind, AssertUnwindSafe};
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(AssertUnwindSafe(|| $e));
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Deterministic values in `[-1, 1]`.
pub fn random_values(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect()
}

/// Deterministic values in `[lower, upper]`.
pub fn random_values_in(len: usize, lower: f64, upper: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(lower..=upper)).collect()
}

/// A `Q x D` cosine-transform-like interpolation table, `B[(q, d)] = cos(pi d (q + 1/2) / Q)`.
///
/// The first column is identically one.
pub fn dct_like_table(num_quad_1d: usize, num_dofs_1d: usize) -> DMatrix<f64> {
    let q1d = num_quad_1d as f64;
    DMatrix::from_fn(num_quad_1d, num_dofs_1d, |q, d| {
        (PI * d as f64 * (q as f64 + 0.5) / q1d).cos()
    })
}

/// The derivative counterpart of [`dct_like_table`] with respect to the continuous quadrature coordinate.
pub fn dct_like_derivative_table(num_quad_1d: usize, num_dofs_1d: usize) -> DMatrix<f64> {
    let q1d = num_quad_1d as f64;
    DMatrix::from_fn(num_quad_1d, num_dofs_1d, |q, d| {
        let k = PI * d as f64 / q1d;
        -k * (k * (q as f64 + 0.5)).sin()
    })
}

pub fn ipow(base: usize, exp: usize) -> usize {
    (0..exp).fold(1, |acc, _| acc * base)
}
