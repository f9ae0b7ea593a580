//! The convergence ("happiness") test for candidate solutions.
//!
//! A subinterval is resolved when, for every function component, the
//! trailing Chebyshev coefficients of the candidate solution fall below
//! `tolerance * scale`, where the scale is that component's global value
//! scale supplied by the discretization model. Auxiliary components are
//! algebraic byproducts with no spectral expansion and are never tested.

use crate::algorithms::discretize::{DiscretizationModel, PartitionedSolution};
use crate::chebyshev::{significant_length, vals2coeffs};
use crate::preferences::Preferences;

/// Trailing coefficients that must sit below threshold before a piece
/// counts as resolved. Fewer and a slowly decaying series can masquerade
/// as converged at coarse resolutions.
const TAIL_LENGTH: usize = 3;

/// Outcome of one convergence check.
pub struct ConvergenceResult {
    /// Per-subinterval resolution verdicts, all function components
    /// combined.
    pub done: Vec<bool>,
    /// Achieved relative error estimate: the largest trailing-coefficient
    /// magnitude relative to its component scale, floored at machine
    /// precision.
    pub epslevel: f64,
    /// Significant coefficient counts, `cutoffs[fun_rank][piece]`.
    pub cutoffs: Vec<Vec<usize>>,
}

impl ConvergenceResult {
    /// Whether every subinterval is resolved.
    pub fn all_done(&self) -> bool {
        self.done.iter().all(|&d| d)
    }
}

/// Test every (function component, subinterval) pair of a candidate
/// solution against the trailing-coefficient criterion.
pub fn test(
    model: &DiscretizationModel,
    solution: &PartitionedSolution,
    scales: &[f64],
    prefs: &Preferences,
) -> ConvergenceResult {
    let n_pieces = model.dimensions().len();
    let mut done = vec![true; n_pieces];
    let mut epslevel = 0.0f64;
    let mut cutoffs = Vec::with_capacity(solution.fun_values.len());

    for (rank, per_piece) in solution.fun_values.iter().enumerate() {
        let scale = scales[rank];
        // A component that is numerically zero everywhere has nothing to
        // resolve; fall back to an absolute threshold so exact zeros pass.
        let threshold = if scale > 0.0 {
            prefs.tolerance * scale
        } else {
            prefs.tolerance
        };
        let mut component_cutoffs = Vec::with_capacity(n_pieces);
        for (piece, values) in per_piece.iter().enumerate() {
            let n = values.len();
            let coeffs = vals2coeffs(values);
            let cutoff = significant_length(&coeffs, threshold);
            if cutoff + TAIL_LENGTH > n {
                done[piece] = false;
            }
            let tail_max = coeffs[cutoff.min(n)..]
                .iter()
                .fold(0.0f64, |m, c| m.max(c.abs()));
            epslevel = epslevel.max(tail_max / scale.max(1.0e-300));
            component_cutoffs.push(cutoff);
        }
        cutoffs.push(component_cutoffs);
    }

    ConvergenceResult {
        done,
        epslevel: epslevel.max(f64::EPSILON),
        cutoffs,
    }
}
