//! Piecewise Chebyshev representation of functions on an interval.
//!
//! A [`PiecewiseFunction`] is an ordered list of contiguous pieces, each
//! holding the Chebyshev coefficients of a smooth function on its
//! subinterval. The propagation driver only ever builds these from the
//! discrete value vectors produced by its own collocation maps; the adaptive
//! constructor [`PiecewiseFunction::from_fn`] exists so that callers can
//! produce initial states with the same representation.

use crate::chebyshev::{
    clenshaw, coeffs2vals, scaled_nodes, significant_length, vals2coeffs,
};

/// Resolutions attempted by the adaptive constructor, in order.
const CONSTRUCTION_SIZES: [usize; 7] = [17, 33, 65, 129, 257, 513, 1025];

/// Relative coefficient tolerance used when constructing from a closure.
const CONSTRUCTION_TOL: f64 = 1e-13;

/// One smooth piece: an interval and the Chebyshev coefficients of the
/// function restricted to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Piece {
    lower: f64,
    upper: f64,
    coeffs: Vec<f64>,
}

impl Piece {
    fn evaluate(&self, x: f64) -> f64 {
        // Map to standard coordinates on [-1, 1].
        let t = 2.0 * (x - self.lower) / (self.upper - self.lower) - 1.0;
        clenshaw(&self.coeffs, t)
    }
}

/// A function on a bounded interval, stored as contiguous Chebyshev pieces.
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseFunction {
    pieces: Vec<Piece>,
}

impl PiecewiseFunction {
    /// Build a single-piece function from Chebyshev coefficients on
    /// `[lower, upper]`.
    ///
    /// # Panics
    ///
    /// Panics when the interval is degenerate or the coefficient list is
    /// empty; both indicate a caller bug rather than a recoverable state.
    pub fn from_coeffs(lower: f64, upper: f64, coeffs: Vec<f64>) -> Self {
        assert!(
            lower < upper && lower.is_finite() && upper.is_finite(),
            "piece interval [{lower}, {upper}] is not a bounded interval"
        );
        assert!(!coeffs.is_empty(), "a piece needs at least one coefficient");
        Self {
            pieces: vec![Piece {
                lower,
                upper,
                coeffs,
            }],
        }
    }

    /// Build a single-piece function from values at second-kind Chebyshev
    /// points (descending order) on `[lower, upper]`.
    pub fn from_values(lower: f64, upper: f64, values: &[f64]) -> Self {
        Self::from_coeffs(lower, upper, vals2coeffs(values))
    }

    /// Assemble a multi-piece function from per-piece coefficient vectors.
    ///
    /// `breakpoints` must be strictly increasing with one more entry than
    /// `piece_coeffs`.
    pub fn from_pieces(breakpoints: &[f64], piece_coeffs: Vec<Vec<f64>>) -> Self {
        assert_eq!(
            breakpoints.len(),
            piece_coeffs.len() + 1,
            "breakpoint/piece count mismatch"
        );
        let pieces = piece_coeffs
            .into_iter()
            .enumerate()
            .map(|(p, coeffs)| {
                assert!(!coeffs.is_empty(), "piece {p} has no coefficients");
                Piece {
                    lower: breakpoints[p],
                    upper: breakpoints[p + 1],
                    coeffs,
                }
            })
            .collect();
        Self { pieces }
    }

    /// Adaptively sample a closure until its Chebyshev coefficients decay
    /// below a fixed relative tolerance, then truncate to the significant
    /// length. Falls back to the largest attempted resolution for closures
    /// that never resolve (e.g. non-smooth input data).
    pub fn from_fn(lower: f64, upper: f64, f: impl Fn(f64) -> f64) -> Self {
        let mut coeffs = Vec::new();
        for &n in CONSTRUCTION_SIZES.iter() {
            let values: Vec<f64> = scaled_nodes(n, lower, upper)
                .into_iter()
                .map(&f)
                .collect();
            coeffs = vals2coeffs(&values);
            let scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            let cutoff = significant_length(&coeffs, CONSTRUCTION_TOL * scale);
            if cutoff + 3 <= n {
                coeffs.truncate(cutoff);
                break;
            }
        }
        Self::from_coeffs(lower, upper, coeffs)
    }

    /// The function's domain as `(lower, upper)`.
    pub fn domain(&self) -> (f64, f64) {
        (
            self.pieces.first().map(|p| p.lower).unwrap_or(0.0),
            self.pieces.last().map(|p| p.upper).unwrap_or(0.0),
        )
    }

    /// All breakpoints, outer endpoints included.
    pub fn breakpoints(&self) -> Vec<f64> {
        let mut bp: Vec<f64> = self.pieces.iter().map(|p| p.lower).collect();
        if let Some(last) = self.pieces.last() {
            bp.push(last.upper);
        }
        bp
    }

    /// Total representation length: the sum of per-piece coefficient counts.
    pub fn length(&self) -> usize {
        self.pieces.iter().map(|p| p.coeffs.len()).sum()
    }

    /// The longest single piece, which is the minimal resolution any
    /// rediscretization of this function must offer.
    pub fn max_piece_length(&self) -> usize {
        self.pieces.iter().map(|p| p.coeffs.len()).max().unwrap_or(1)
    }

    /// Number of smooth pieces.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Coefficients of piece `index`.
    pub fn piece_coeffs(&self, index: usize) -> &[f64] {
        &self.pieces[index].coeffs
    }

    /// Evaluate at `x`. Points outside the domain are clamped to the
    /// nearest endpoint; interior breakpoints resolve to the left piece.
    pub fn evaluate(&self, x: f64) -> f64 {
        let piece = self
            .pieces
            .iter()
            .find(|p| x <= p.upper)
            .or_else(|| self.pieces.last());
        match piece {
            Some(p) => p.evaluate(x.clamp(p.lower, p.upper)),
            None => 0.0,
        }
    }

    /// Sample at `n` second-kind Chebyshev points on `[a, b]`, descending,
    /// matching the grid convention of the discretizer.
    pub fn sample(&self, n: usize, a: f64, b: f64) -> Vec<f64> {
        scaled_nodes(n, a, b)
            .into_iter()
            .map(|x| self.evaluate(x))
            .collect()
    }

    /// Restrict to the subdomain `[a, b]`, re-expanding each overlapping
    /// piece at its current resolution.
    pub fn restrict(&self, a: f64, b: f64) -> Self {
        assert!(a < b, "restriction interval [{a}, {b}] is empty");
        let mut pieces = Vec::new();
        for piece in &self.pieces {
            let lo = piece.lower.max(a);
            let hi = piece.upper.min(b);
            if hi - lo <= 0.0 {
                continue;
            }
            let n = piece.coeffs.len().max(2);
            let values = self.sample(n, lo, hi);
            pieces.push(Piece {
                lower: lo,
                upper: hi,
                coeffs: vals2coeffs(&values),
            });
        }
        assert!(
            !pieces.is_empty(),
            "restriction interval [{a}, {b}] lies outside the domain"
        );
        Self { pieces }
    }

    /// Largest absolute function value over all piece grids.
    pub fn vscale(&self) -> f64 {
        self.pieces
            .iter()
            .flat_map(|p| coeffs2vals(&p.coeffs))
            .fold(0.0f64, |m, v| m.max(v.abs()))
    }

    /// Drop trailing coefficients below `abs_tol` from every piece.
    pub fn simplify(&mut self, abs_tol: f64) {
        for piece in &mut self.pieces {
            let cutoff = significant_length(&piece.coeffs, abs_tol);
            piece.coeffs.truncate(cutoff);
        }
    }

    /// Attempt to replace a multi-piece representation by a single global
    /// piece. The candidate interpolant is sampled at `sample_len` points
    /// and accepted only when its trailing coefficients decay below
    /// `abs_tol`, i.e. when the function is globally smooth at the working
    /// tolerance. Returns `None` when merging is not warranted.
    pub fn merged_if_smooth(&self, abs_tol: f64, sample_len: usize) -> Option<Self> {
        if self.pieces.len() < 2 {
            return None;
        }
        let (a, b) = self.domain();
        let n = sample_len.max(17);
        let values = self.sample(n, a, b);
        let coeffs = vals2coeffs(&values);
        let cutoff = significant_length(&coeffs, abs_tol);
        if cutoff + 3 <= n {
            let mut merged = coeffs;
            merged.truncate(cutoff);
            Some(Self::from_coeffs(a, b, merged))
        } else {
            None
        }
    }
}
