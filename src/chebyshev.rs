//! Low-level Chebyshev spectral kernels.
//!
//! Everything in this module works on the standard interval `[-1, 1]` with
//! Chebyshev points of the second kind, `x_j = cos(j*pi/(n-1))` for
//! `j = 0..n`, ordered *descending* from `1` to `-1`. All higher layers
//! (function representation, discretizer) adopt the same ordering so that
//! value vectors, differentiation matrices, and interpolation rows compose
//! without permutations.

use faer::Mat;
use std::f64::consts::PI;

/// Chebyshev points of the second kind on `[-1, 1]`, descending.
///
/// A single point degenerates to the interval midpoint.
pub fn chebyshev_nodes(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.0];
    }
    let nm1 = (n - 1) as f64;
    (0..n).map(|j| (j as f64 * PI / nm1).cos()).collect()
}

/// Chebyshev points mapped affinely onto `[a, b]`, descending from `b` to `a`.
pub fn scaled_nodes(n: usize, a: f64, b: f64) -> Vec<f64> {
    chebyshev_nodes(n)
        .into_iter()
        .map(|x| a + (b - a) * (x + 1.0) * 0.5)
        .collect()
}

/// Build the Chebyshev differentiation matrix `D` for `n` points.
///
/// `(D v)_i` approximates `p'(x_i)` where `p` is the degree-`n-1`
/// interpolant through the values `v` at the second-kind points. The
/// diagonal entries use the negative-sum trick, which is the numerically
/// preferred form of the closed formula.
pub fn diff_matrix(n: usize) -> Mat<f64> {
    let mut d = Mat::<f64>::zeros(n, n);
    if n < 2 {
        return d;
    }
    let x = chebyshev_nodes(n);

    // Endpoint weights are doubled.
    let mut c = vec![1.0; n];
    c[0] = 2.0;
    c[n - 1] = 2.0;

    for i in 0..n {
        for j in 0..n {
            if i != j {
                let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                d[(i, j)] = (c[i] / c[j]) * sign / (x[i] - x[j]);
            }
        }
    }

    // Diagonal entries: D[i,i] = -sum_{j!=i} D[i,j]
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..n {
            if j != i {
                sum += d[(i, j)];
            }
        }
        d[(i, i)] = -sum;
    }

    d
}

/// Transform values at second-kind points into Chebyshev coefficients.
///
/// Direct `O(n^2)` evaluation of the type-I discrete cosine transform. The
/// discretization sizes this crate works at never justify an FFT path.
pub fn vals2coeffs(vals: &[f64]) -> Vec<f64> {
    let n = vals.len();
    if n <= 1 {
        return vals.to_vec();
    }
    let nm1 = (n - 1) as f64;
    let mut coeffs = vec![0.0; n];
    for (k, coeff) in coeffs.iter_mut().enumerate() {
        // First and last terms enter with half weight.
        let last = if k % 2 == 0 { vals[n - 1] } else { -vals[n - 1] };
        let mut acc = 0.5 * (vals[0] + last);
        for (i, &v) in vals.iter().enumerate().take(n - 1).skip(1) {
            acc += v * ((k as f64) * (i as f64) * PI / nm1).cos();
        }
        let scale = if k == 0 || k == n - 1 {
            1.0 / nm1
        } else {
            2.0 / nm1
        };
        *coeff = scale * acc;
    }
    coeffs
}

/// Inverse of [`vals2coeffs`]: evaluate the Chebyshev series at the
/// second-kind points.
pub fn coeffs2vals(coeffs: &[f64]) -> Vec<f64> {
    let n = coeffs.len();
    if n <= 1 {
        return coeffs.to_vec();
    }
    let nm1 = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            for (k, &c) in coeffs.iter().enumerate() {
                acc += c * ((k as f64) * (i as f64) * PI / nm1).cos();
            }
            acc
        })
        .collect()
}

/// Evaluate a Chebyshev series at `t` in `[-1, 1]` by Clenshaw recurrence.
pub fn clenshaw(coeffs: &[f64], t: f64) -> f64 {
    let mut b1 = 0.0;
    let mut b2 = 0.0;
    for &c in coeffs.iter().skip(1).rev() {
        let b0 = c + 2.0 * t * b1 - b2;
        b2 = b1;
        b1 = b0;
    }
    coeffs.first().copied().unwrap_or(0.0) + t * b1 - b2
}

/// Row of barycentric interpolation weights evaluating the degree-`n-1`
/// interpolant through second-kind points at the target `t` in `[-1, 1]`.
///
/// If `t` coincides with a node the row is the corresponding unit vector,
/// avoiding the removable singularity in the barycentric formula.
pub fn barycentric_row(n: usize, t: f64) -> Vec<f64> {
    let nodes = chebyshev_nodes(n);
    if let Some(hit) = nodes.iter().position(|&x| (x - t).abs() < 1e-14) {
        let mut row = vec![0.0; n];
        row[hit] = 1.0;
        return row;
    }
    let mut row = vec![0.0; n];
    let mut denom = 0.0;
    for (i, &x) in nodes.iter().enumerate() {
        let mut w = if i % 2 == 0 { 1.0 } else { -1.0 };
        if i == 0 || i == n - 1 {
            w *= 0.5;
        }
        let term = w / (t - x);
        row[i] = term;
        denom += term;
    }
    for r in row.iter_mut() {
        *r /= denom;
    }
    row
}

/// Number of leading coefficients that stand above `abs_tol` in magnitude.
///
/// This is the cutoff length shared by the convergence tester, final
/// truncation, and piece merging: everything past the returned index is
/// negligible at the given absolute tolerance. Always at least 1 so that a
/// numerically zero series keeps its constant term.
pub fn significant_length(coeffs: &[f64], abs_tol: f64) -> usize {
    coeffs
        .iter()
        .rposition(|c| c.abs() > abs_tol)
        .map(|idx| idx + 1)
        .unwrap_or(1)
}
