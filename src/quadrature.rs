//! One-dimensional rules on the reference interval `[0, 1]`.
//!
//! These are used to build tensor-product basis tables and the matching per-element
//! integration weights.
use std::f64::consts::PI;

/// Recurrence relation for Legendre polynomials on `[-1, 1]`.
///
/// Derivatives use a formula that is *not* defined at |x| == 1.
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn previous(&self) -> f64 {
        self.p2
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        n * (x * p1 - p2) / (x * x - 1.0)
    }
}

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_ITER: usize = 100;

/// Gauss-Legendre rule with `num_points` points on `[0, 1]`, returned as `(weights, points)`.
///
/// The rule integrates polynomials of degree up to `2 n - 1` exactly. Points are increasing.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss_legendre(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    // Roots come in symmetric pairs, so only the first half is computed
    let m = (n + 1) / 2;
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut recurrence = LegendreRecurrence::evaluate(n, x);
        for _ in 0..NEWTON_MAX_ITER {
            let dx = -recurrence.value() / recurrence.derivative();
            x += dx;
            recurrence = LegendreRecurrence::evaluate(n, x);
            if dx.abs() <= NEWTON_TOLERANCE {
                break;
            }
        }
        let dp = recurrence.derivative();
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // x is the i-th largest root on [-1, 1]
        points[n - 1 - i] = 0.5 * (1.0 + x);
        points[i] = 0.5 * (1.0 - x);
        weights[n - 1 - i] = 0.5 * w;
        weights[i] = 0.5 * w;
    }

    (weights, points)
}

/// Gauss-Lobatto points on `[0, 1]`, including both end points when `num_points >= 2`.
///
/// A single point is placed at the interval midpoint. Points are increasing.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss_lobatto_points(num_points: usize) -> Vec<f64> {
    assert!(num_points > 0, "number of points must be positive");
    if num_points == 1 {
        return vec![0.5];
    }

    // Interior points are the roots of P'_N, N = num_points - 1. Newton iteration on
    //  x P_N(x) - P_{N - 1}(x),
    // starting from Chebyshev-Gauss-Lobatto points, leaves the end points fixed.
    let big_n = num_points - 1;
    (0..num_points)
        .map(|i| {
            let mut x = (PI * i as f64 / big_n as f64).cos();
            for _ in 0..NEWTON_MAX_ITER {
                let recurrence = LegendreRecurrence::evaluate(big_n, x);
                let p_n = recurrence.value();
                let dx = (x * p_n - recurrence.previous()) / (num_points as f64 * p_n);
                x -= dx;
                if dx.abs() <= NEWTON_TOLERANCE {
                    break;
                }
            }
            0.5 * (1.0 - x)
        })
        .collect()
}

/// Tensor-product weights for a `dim`-dimensional Gauss-Legendre rule with `num_points_per_dim`
/// points per dimension. The first coordinate runs fastest.
pub fn tensor_weights(dim: usize, num_points_per_dim: usize) -> Vec<f64> {
    let (weights1d, _) = gauss_legendre(num_points_per_dim);
    (0..dim).fold(vec![1.0], |acc, _| {
        weights1d
            .iter()
            .flat_map(|&w_outer| acc.iter().map(move |&w_inner| w_inner * w_outer))
            .collect()
    })
}
