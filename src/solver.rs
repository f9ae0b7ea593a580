//! The propagation driver: the public API for advancing a state through
//! the semigroup generated by a linear operator.
//!
//! For each requested time the driver runs the adaptive loop
//! `Discretize -> Propagate -> Check -> Refine` until every subinterval
//! passes the convergence test or the resolution ladder is exhausted.
//! Exhaustion degrades gracefully: a warning is logged and the best
//! available approximation is returned. Zero times short-circuit to the
//! unmodified initial condition; each entry of the time vector is tested
//! individually, so a zero anywhere in the sequence affects only its own
//! column.
//!
//! Per-subinterval resolutions persist across the time loop: a
//! subinterval that resolved at some size for one time is tried at that
//! same size first for the next, which is usually right since later
//! solutions of the equations this crate targets are no rougher than
//! earlier ones. Done-flags are reinitialized for every time.

use crate::algorithms::convergence::{self, ConvergenceResult};
use crate::algorithms::discretize::{Discretization, DiscretizationModel, PartitionedSolution};
use crate::algorithms::expm;
use crate::algorithms::resolution;
use crate::chebyshev::vals2coeffs;
use crate::error::{PropagationError, PropagationErrorKind};
use crate::function::PiecewiseFunction;
use crate::operator::{ComponentKind, LinearOperator};
use crate::preferences::Preferences;
use crate::state::{Block, BlockVector, InitialState, PropagationOutput};

/// Grids coarser than this cannot carry a second-order operator with two
/// constraint rows, whatever the input data looks like.
const MIN_DIMENSION: usize = 4;

/// Per-time diagnostics reported by [`propagate_detailed`].
#[derive(Clone, Debug)]
pub struct TimeDiagnostics {
    /// The requested time value.
    pub time: f64,
    /// Whether every subinterval passed the convergence test.
    pub converged: bool,
    /// Final per-subinterval resolutions.
    pub dimensions: Vec<usize>,
    /// Achieved relative error estimate.
    pub epslevel: f64,
    /// Significant coefficient counts, `cutoffs[fun_rank][piece]`. Empty
    /// for short-circuited zero times.
    pub cutoffs: Vec<Vec<usize>>,
}

/// Propagate `initial_state` through `exp(t * L)` for every `t` in
/// `times`.
///
/// The result has one column per requested time and one row per operator
/// component. When both collapse to a single function block the bare
/// [`PiecewiseFunction`] is returned instead; see
/// [`PropagationOutput`] for the narrowing rule.
///
/// Pass `None` for `preferences` to use [`Preferences::default`].
pub fn propagate(
    operator: &LinearOperator,
    times: &[f64],
    initial_state: impl Into<InitialState>,
    preferences: Option<&Preferences>,
) -> Result<PropagationOutput, PropagationError> {
    propagate_detailed(operator, times, initial_state, preferences).map(|(output, _)| output)
}

/// Like [`propagate`], additionally returning per-time diagnostics:
/// the resolutions actually used, the convergence verdict, and the error
/// estimate. The diagnostics are how callers observe a ladder exhaustion
/// beyond the logged warning.
pub fn propagate_detailed(
    operator: &LinearOperator,
    times: &[f64],
    initial_state: impl Into<InitialState>,
    preferences: Option<&Preferences>,
) -> Result<(PropagationOutput, Vec<TimeDiagnostics>), PropagationError> {
    let owned_defaults;
    let prefs = match preferences {
        Some(p) => p,
        None => {
            owned_defaults = Preferences::default();
            &owned_defaults
        }
    };

    // --- Init: fail fast, before any matrix is assembled.
    for &t in times {
        if !t.is_finite() || t < 0.0 {
            return Err(PropagationErrorKind::InvalidTime { value: t }.into());
        }
    }
    let mut discretization = Discretization::new(operator, MIN_DIMENSION)?;
    let state = initial_state.into();
    let blocks = validate_state(operator, &state)?;

    // Never discretize coarser than the input data already requires.
    let min_dimension = blocks
        .iter()
        .filter_map(|b| b.as_function())
        .map(|f| f.max_piece_length())
        .max()
        .unwrap_or(MIN_DIMENSION)
        .max(MIN_DIMENSION);
    let ladder = resolution::candidate_dimensions(prefs, min_dimension);
    let Some(&first_dimension) = ladder.first() else {
        return Err(PropagationErrorKind::EmptyLadder.into());
    };
    for piece in 0..operator.piece_count() {
        discretization.set_dimension(piece, first_dimension);
    }

    let n_components = operator.components().len();
    let mut results = BlockVector::with_capacity(n_components, times.len());
    let mut diagnostics = Vec::with_capacity(times.len());

    for &time in times {
        if time == 0.0 {
            // The semigroup at t = 0 is the identity; the initial
            // condition is the answer and needs no discretization.
            results.push_column(blocks.clone());
            diagnostics.push(TimeDiagnostics {
                time,
                converged: true,
                dimensions: discretization.dimensions().to_vec(),
                epslevel: f64::EPSILON,
                cutoffs: Vec::new(),
            });
            continue;
        }
        let (column, diag) =
            solve_single_time(operator, &mut discretization, &blocks, time, &ladder, prefs)?;
        results.push_column(column);
        diagnostics.push(diag);
    }

    let output = if n_components == 1 && times.len() == 1 {
        match results.into_single() {
            Some(Block::Function(f)) => PropagationOutput::Function(f),
            Some(block) => PropagationOutput::Blocks(BlockVector::column(vec![block])),
            None => unreachable!("1x1 result shape"),
        }
    } else {
        PropagationOutput::Blocks(results)
    };
    Ok((output, diagnostics))
}

/// The refinement loop for one nonzero time value.
fn solve_single_time(
    operator: &LinearOperator,
    discretization: &mut Discretization<'_>,
    blocks: &[Block],
    time: f64,
    ladder: &[usize],
    prefs: &Preferences,
) -> Result<(Vec<Block>, TimeDiagnostics), PropagationError> {
    let n_pieces = operator.piece_count();
    let mut done = vec![false; n_pieces];
    let mut converged = false;
    let mut accepted: Option<(DiscretizationModel, PartitionedSolution, Vec<f64>, ConvergenceResult)> =
        None;

    loop {
        let model = discretization.build();
        let propagator = expm::exponentiate(&model, time)?;
        let v0 = model.to_values(blocks);
        let advanced = propagator.apply(v0.as_ref());
        if !expm::all_finite(advanced.as_ref()) {
            return Err(PropagationErrorKind::NonFiniteExponential {
                time,
                dimension: model.size(),
            }
            .into());
        }
        let solution = model.from_values(advanced.as_ref());
        let scales = model.scale(&solution);
        let check = convergence::test(&model, &solution, &scales, prefs);

        // Latch: a subinterval resolved at a coarser pass stays resolved
        // and keeps its frozen resolution for this time value.
        for (latched, fresh) in done.iter_mut().zip(check.done.iter()) {
            *latched = *latched || *fresh;
        }
        let all_done = done.iter().all(|&d| d);
        accepted = Some((model, solution, scales, check));
        if all_done {
            converged = true;
            break;
        }

        let mut refined = false;
        for piece in 0..n_pieces {
            if done[piece] {
                continue;
            }
            if let Some(next) = resolution::next_dimension(ladder, discretization.dimensions()[piece])
            {
                discretization.set_dimension(piece, next);
                refined = true;
            }
        }
        if !refined {
            let unresolved = done.iter().filter(|&&d| !d).count();
            let epslevel = accepted.as_ref().map(|(_, _, _, c)| c.epslevel).unwrap_or(f64::NAN);
            log::warn!(
                "resolution ladder exhausted at time {time}: {unresolved} of {n_pieces} \
                 subintervals unresolved (epslevel {epslevel:.3e}); returning best available \
                 approximation"
            );
            break;
        }
        log::debug!(
            "time {time}: refining to dimensions {:?}",
            discretization.dimensions()
        );
    }

    let (model, solution, scales, check) = accepted.expect("loop ran at least once");
    let column = assemble_column(operator, &model, &solution, &scales, &check, time, prefs);
    let diag = TimeDiagnostics {
        time,
        converged,
        dimensions: model.dimensions().to_vec(),
        epslevel: check.epslevel,
        cutoffs: check.cutoffs.clone(),
    };
    Ok((column, diag))
}

/// Reconstruct one result column from the accepted discrete solution:
/// per-piece coefficients truncated to the reported cutoffs, merged into
/// a single smooth piece when the merging policy allows it, auxiliary
/// scalars passed through.
fn assemble_column(
    operator: &LinearOperator,
    model: &DiscretizationModel,
    solution: &PartitionedSolution,
    scales: &[f64],
    check: &ConvergenceResult,
    time: f64,
    prefs: &Preferences,
) -> Vec<Block> {
    let mut column = Vec::with_capacity(operator.components().len());
    let mut fun_rank = 0;
    let mut aux_rank = 0;
    for kind in operator.components() {
        match kind {
            ComponentKind::Function => {
                let per_piece = &solution.fun_values[fun_rank];
                let mut piece_coeffs = Vec::with_capacity(per_piece.len());
                for (piece, values) in per_piece.iter().enumerate() {
                    let mut coeffs = vals2coeffs(values);
                    let cutoff = check.cutoffs[fun_rank][piece]
                        .min(coeffs.len())
                        .max(1);
                    coeffs.truncate(cutoff);
                    piece_coeffs.push(coeffs);
                }
                let mut f = PiecewiseFunction::from_pieces(model.breakpoints(), piece_coeffs);
                if time > 0.0 && prefs.merge_pieces && f.piece_count() > 1 {
                    // The solutions this crate targets are smooth for
                    // t > 0, so a successful global interpolation is
                    // expected rather than exceptional. The merge
                    // threshold is two orders looser than the solve
                    // tolerance: the stitched pieces carry epslevel-size
                    // seams that a global interpolant cannot beat.
                    let abs_tol = if scales[fun_rank] > 0.0 {
                        100.0 * prefs.tolerance * scales[fun_rank]
                    } else {
                        100.0 * prefs.tolerance
                    };
                    let sample_len = f.length().min(prefs.max_dimension()).max(17);
                    if let Some(merged) = f.merged_if_smooth(abs_tol, sample_len) {
                        f = merged;
                    }
                }
                column.push(Block::Function(f));
                fun_rank += 1;
            }
            ComponentKind::Auxiliary => {
                column.push(Block::Scalar(solution.aux_values[aux_rank]));
                aux_rank += 1;
            }
        }
    }
    column
}

/// Check the initial state against the operator's component list and
/// domain, returning the resolved block column.
fn validate_state(
    operator: &LinearOperator,
    state: &InitialState,
) -> Result<Vec<Block>, PropagationError> {
    let expected = operator.components().len();
    if let InitialState::Blocks(v) = state {
        if v.cols() != 1 || v.rows() != expected {
            return Err(PropagationErrorKind::BlockCountMismatch {
                expected,
                actual: v.len(),
            }
            .into());
        }
    }
    let blocks = state.to_column();
    if blocks.len() != expected {
        return Err(PropagationErrorKind::BlockCountMismatch {
            expected,
            actual: blocks.len(),
        }
        .into());
    }
    let (lower, upper) = operator.domain();
    let span_tol = 1e-9 * (upper - lower).abs().max(1.0);
    for (index, (block, kind)) in blocks.iter().zip(operator.components()).enumerate() {
        match (block, kind) {
            (Block::Function(f), ComponentKind::Function) => {
                let (a, b) = f.domain();
                if (a - lower).abs() > span_tol || (b - upper).abs() > span_tol {
                    return Err(PropagationErrorKind::DomainMismatch {
                        index,
                        got_lower: a,
                        got_upper: b,
                        lower,
                        upper,
                    }
                    .into());
                }
            }
            (Block::Scalar(_), ComponentKind::Auxiliary) => {}
            _ => {
                return Err(PropagationErrorKind::BlockKindMismatch { index }.into());
            }
        }
    }
    Ok(blocks)
}
