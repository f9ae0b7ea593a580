//! Integration test suite verifying the mathematical correctness of the
//! adaptive propagation driver.
//!
//! # Test Methodology
//!
//! The core principle of this suite is to validate the computed semigroup
//! action against ground truths that can be written down analytically.
//! This is the standard validation technique for adaptive spectral
//! solvers, and it probes the whole pipeline at once: collocation
//! assembly, constraint elimination, the dense matrix exponential, and
//! the refinement loop.
//!
//! The methodology consists of the following steps:
//! 1.  **Construct an operator with known spectral structure.** The heat
//!     operator `u -> u''` with zero Dirichlet conditions on `[-1, 1]`
//!     has eigenfunctions `cos(pi x / 2)`, `sin(pi x)`, ... with known
//!     decay rates, so `exp(t L)` acts on them by an explicit scalar
//!     factor. The advection operator `u -> -u'` transports its argument,
//!     giving a second, genuinely non-normal ground truth.
//! 2.  **Propagate and compare pointwise.** The returned piecewise
//!     function is evaluated against the analytic solution on a fixed
//!     sample grid and the maximum error is asserted below a tolerance.
//! 3.  **Check the structural contracts.** Zero times reproduce the
//!     input exactly, result shapes follow the documented narrowing rule,
//!     boundary and continuity functionals annihilate every accepted
//!     result, repeated calls are bit-identical, and exhausting the
//!     resolution ladder degrades to a warning rather than an error.

use anyhow::{ensure, Result};
use chebprop::{
    propagate, propagate_detailed, Block, BlockVector, Coefficient, ComponentKind,
    LinearFunctional, LinearOperator, PiecewiseFunction, Preferences, PropagationOutput,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// Tolerance for comparisons against analytic solutions. The solver runs
/// at its default tolerance of 1e-10; a comfortable margin absorbs the
/// final truncation to the reported cutoff.
const ANALYTIC_TOLERANCE: f64 = 1e-6;

/// Tolerance on boundary/continuity functional residuals of accepted
/// results.
const CONSTRAINT_TOLERANCE: f64 = 1e-8;

/// Looser tolerance for the transported bump: the advection ground truth
/// leaks a ~1e-7 tail through the outflow boundary.
const TRANSPORT_TOLERANCE: f64 = 1e-4;

/// Decay rate of the slowest Dirichlet mode of `u''` on `[-1, 1]`.
const LAMBDA_1: f64 = PI * PI / 4.0;

/// The heat operator `u -> u''` with zero Dirichlet conditions.
fn heat_operator(breakpoints: Vec<f64>) -> LinearOperator {
    let mut op = LinearOperator::scalar(breakpoints);
    op.add_term(0, 0, 2, Coefficient::Constant(1.0));
    let (a, b) = op.domain();
    op.dirichlet(0, a);
    op.dirichlet(0, b);
    op
}

/// The slowest Dirichlet eigenfunction of the heat operator on `[-1, 1]`.
fn eigenfunction() -> PiecewiseFunction {
    PiecewiseFunction::from_fn(-1.0, 1.0, |x| (PI * x / 2.0).cos())
}

/// A Gaussian bump, numerically zero at the boundary.
fn gaussian() -> PiecewiseFunction {
    PiecewiseFunction::from_fn(-1.0, 1.0, |x| (-30.0 * x * x).exp())
}

/// Evaluation grid avoiding the endpoints, where analytic comparisons are
/// made.
fn sample_points() -> Vec<f64> {
    (0..37).map(|i| -0.9 + 1.8 * i as f64 / 36.0).collect()
}

fn expect_function(output: PropagationOutput) -> PiecewiseFunction {
    match output {
        PropagationOutput::Function(f) => f,
        PropagationOutput::Blocks(_) => panic!("expected a bare function result"),
    }
}

/// A macro generating analytic-decay tests: propagating the slowest
/// eigenfunction for time `t` must reproduce `exp(-lambda t)` times the
/// initial state, pointwise.
macro_rules! generate_decay_test {
    ($test_name:ident, $time:expr) => {
        #[test]
        fn $test_name() -> Result<()> {
            let op = heat_operator(vec![-1.0, 1.0]);
            let (output, diagnostics) =
                propagate_detailed(&op, &[$time], eigenfunction(), None)?;
            let u = expect_function(output);

            ensure!(diagnostics[0].converged, "refinement did not converge");
            ensure!(
                diagnostics[0].epslevel < 1e-8,
                "epslevel too large: {}",
                diagnostics[0].epslevel
            );

            let factor = (-LAMBDA_1 * $time as f64).exp();
            for x in sample_points() {
                let want = factor * (PI * x / 2.0).cos();
                let got = u.evaluate(x);
                ensure!(
                    (got - want).abs() < ANALYTIC_TOLERANCE,
                    "at x = {x}: {got} vs {want}"
                );
            }
            Ok(())
        }
    };
}

generate_decay_test!(test_eigenfunction_decay_short_time, 0.25);
generate_decay_test!(test_eigenfunction_decay_unit_time, 1.0);

#[test]
fn test_zero_time_returns_initial_state_unchanged() -> Result<()> {
    let op = heat_operator(vec![-1.0, 1.0]);
    let bump = gaussian();
    let output = propagate(&op, &[0.0], bump.clone(), None)?;
    let u = expect_function(output);
    ensure!(u == bump, "t = 0 must reproduce the initial state exactly");
    Ok(())
}

#[test]
fn test_zero_time_inside_time_vector_is_independent() -> Result<()> {
    // A zero anywhere in the time vector must short-circuit only its own
    // column; the other entries still go through the full solve.
    let op = heat_operator(vec![-1.0, 1.0]);
    let bump = gaussian();
    let output = propagate(&op, &[0.0, 0.4], bump.clone(), None)?;
    let states = output.as_blocks().expect("two columns");
    ensure!(states.cols() == 2);

    let at_zero = states.block(0, 0).as_function().expect("function block");
    ensure!(at_zero == &bump, "column for t = 0 must equal the input");

    let later = states.block(0, 1).as_function().expect("function block");
    let decayed = later.evaluate(0.0);
    ensure!(
        decayed > 0.0 && decayed < 0.9,
        "diffusion should have damped the bump, got {decayed}"
    );
    Ok(())
}

#[test]
fn test_shape_contract() -> Result<()> {
    let op = heat_operator(vec![-1.0, 1.0]);

    // Singleton operator output and singleton time: a bare function.
    let single = propagate(&op, &[0.1], gaussian(), None)?;
    ensure!(single.as_function().is_some(), "1x1 shape must narrow");

    // Several times: one column per time.
    let times = [0.05, 0.1, 0.2, 0.4];
    let many = propagate(&op, &times, gaussian(), None)?;
    let blocks = many.as_blocks().expect("block result");
    ensure!(blocks.rows() == 1);
    ensure!(blocks.cols() == times.len());
    Ok(())
}

#[test]
fn test_boundary_conditions_hold_on_accepted_results() -> Result<()> {
    let op = heat_operator(vec![-1.0, 1.0]);
    let output = propagate(&op, &[0.1], gaussian(), None)?;
    let u = expect_function(output);
    ensure!(u.evaluate(-1.0).abs() < CONSTRAINT_TOLERANCE);
    ensure!(u.evaluate(1.0).abs() < CONSTRAINT_TOLERANCE);
    Ok(())
}

#[test]
fn test_random_initial_states_satisfy_constraints() -> Result<()> {
    // Reproducible random smooth initial data: Chebyshev coefficients
    // with geometric decay. The data need not satisfy the boundary
    // conditions; every accepted result must.
    let mut rng = StdRng::seed_from_u64(42);
    let op = heat_operator(vec![-1.0, 1.0]);
    for _ in 0..3 {
        let coeffs: Vec<f64> = (0..24)
            .map(|k| (rng.random::<f64>() - 0.5) * 0.7f64.powi(k))
            .collect();
        let u0 = PiecewiseFunction::from_coeffs(-1.0, 1.0, coeffs);
        let output = propagate(&op, &[0.2], u0, None)?;
        let u = expect_function(output);
        ensure!(u.evaluate(-1.0).abs() < CONSTRAINT_TOLERANCE);
        ensure!(u.evaluate(1.0).abs() < CONSTRAINT_TOLERANCE);
    }
    Ok(())
}

#[test]
fn test_piecewise_domain_matches_single_piece_solution() -> Result<()> {
    // The same problem solved on [-1, 1] and on the split partition
    // [-1, 0, 1] must agree: continuity conditions stitch the pieces
    // into the same solution. Merging is disabled so the continuity
    // machinery is actually exercised.
    let prefs = Preferences {
        merge_pieces: false,
        ..Preferences::default()
    };
    let split_op = heat_operator(vec![-1.0, 0.0, 1.0]);
    let output = propagate(&split_op, &[0.25], eigenfunction(), Some(&prefs))?;
    let u = expect_function(output);
    ensure!(u.piece_count() == 2, "merging was disabled");

    let factor = (-LAMBDA_1 * 0.25).exp();
    for x in sample_points() {
        let want = factor * (PI * x / 2.0).cos();
        ensure!(
            (u.evaluate(x) - want).abs() < 1e-5,
            "at x = {x}: {} vs {want}",
            u.evaluate(x)
        );
    }

    // Value continuity across the interior breakpoint.
    let left = u.evaluate(-1e-13);
    let right = u.evaluate(1e-13);
    ensure!((left - right).abs() < CONSTRAINT_TOLERANCE);
    Ok(())
}

#[test]
fn test_positive_time_merges_smooth_pieces() -> Result<()> {
    // With the default merging policy a split domain collapses back to a
    // single smooth piece for t > 0.
    let split_op = heat_operator(vec![-1.0, 0.0, 1.0]);
    let output = propagate(&split_op, &[0.25], eigenfunction(), None)?;
    let u = expect_function(output);
    ensure!(
        u.piece_count() == 1,
        "expected a merged result, got {} pieces",
        u.piece_count()
    );
    Ok(())
}

#[test]
fn test_looser_tolerance_never_increases_resolution() -> Result<()> {
    let op = heat_operator(vec![-1.0, 1.0]);
    let loose = Preferences {
        tolerance: 1e-6,
        ..Preferences::default()
    };
    let tight = Preferences {
        tolerance: 1e-10,
        ..Preferences::default()
    };
    let (_, diag_loose) = propagate_detailed(&op, &[0.1], gaussian(), Some(&loose))?;
    let (_, diag_tight) = propagate_detailed(&op, &[0.1], gaussian(), Some(&tight))?;
    for (l, t) in diag_loose[0]
        .dimensions
        .iter()
        .zip(diag_tight[0].dimensions.iter())
    {
        ensure!(l <= t, "loose {l} vs tight {t}");
    }
    // The reported cutoff shrinks with the tolerance as well.
    ensure!(diag_loose[0].cutoffs[0][0] <= diag_tight[0].cutoffs[0][0]);
    Ok(())
}

#[test]
fn test_repeat_call_is_bit_identical() -> Result<()> {
    let op = heat_operator(vec![-1.0, 1.0]);
    let first = propagate(&op, &[0.1, 0.7], gaussian(), None)?;
    let second = propagate(&op, &[0.1, 0.7], gaussian(), None)?;
    ensure!(first == second, "identical inputs must give identical output");
    Ok(())
}

#[test]
fn test_end_to_end_gaussian_scenario() -> Result<()> {
    // The scenario from the crate documentation: diffusion of a Gaussian
    // bump observed at t = 0, 0.1 and 1.0. The t = 0 column is the input;
    // the t = 1 solution is smoother than the t = 0.1 solution, visible
    // as a shorter coefficient representation; both respect the boundary.
    let op = heat_operator(vec![-1.0, 1.0]);
    let bump = gaussian();
    let output = propagate(&op, &[0.0, 0.1, 1.0], bump.clone(), None)?;
    let states = output.as_blocks().expect("three columns");

    let at_zero = states.block(0, 0).as_function().expect("function block");
    ensure!(at_zero == &bump);

    let early = states.block(0, 1).as_function().expect("function block");
    let late = states.block(0, 2).as_function().expect("function block");
    ensure!(
        late.length() <= early.length(),
        "t = 1 ({}) should need no more coefficients than t = 0.1 ({})",
        late.length(),
        early.length()
    );
    for f in [early, late] {
        ensure!(f.evaluate(-1.0).abs() < CONSTRAINT_TOLERANCE);
        ensure!(f.evaluate(1.0).abs() < CONSTRAINT_TOLERANCE);
    }
    Ok(())
}

#[test]
fn test_exhausted_ladder_degrades_gracefully() -> Result<()> {
    // A ladder capped far below what the Gaussian needs: the call must
    // still succeed, flag the shortfall in the diagnostics, and return
    // the under-resolved approximation it managed.
    let prefs = Preferences {
        dimension_values: vec![4],
        ..Preferences::default()
    };
    let op = heat_operator(vec![-1.0, 1.0]);
    let (output, diagnostics) =
        propagate_detailed(&op, &[0.1], gaussian(), Some(&prefs))?;
    ensure!(!diagnostics[0].converged, "4 points cannot resolve the bump");
    ensure!(diagnostics[0].dimensions == vec![4]);
    ensure!(diagnostics[0].epslevel > 1e-10);
    let u = expect_function(output);
    ensure!(u.length() <= 4);
    Ok(())
}

#[test]
fn test_advection_transports_bump() -> Result<()> {
    // u' = -u_x moves the profile rightward: u(x, t) = u0(x - t). The
    // generator is genuinely non-normal, exercising the Padé path with a
    // non-symmetric reduced matrix. One inflow condition at x = -1.
    let mut op = LinearOperator::scalar(vec![-1.0, 1.0]);
    op.add_term(0, 0, 1, Coefficient::Constant(-1.0));
    op.dirichlet(0, -1.0);

    let u0 = PiecewiseFunction::from_fn(-1.0, 1.0, |x| (-30.0 * (x + 0.3) * (x + 0.3)).exp());
    let output = propagate(&op, &[0.6], u0, None)?;
    let u = expect_function(output);

    for x in sample_points() {
        let shifted = x - 0.6;
        let want = if shifted >= -1.0 {
            (-30.0 * (shifted + 0.3) * (shifted + 0.3)).exp()
        } else {
            0.0
        };
        ensure!(
            (u.evaluate(x) - want).abs() < TRANSPORT_TOLERANCE,
            "at x = {x}: {} vs {want}",
            u.evaluate(x)
        );
    }
    Ok(())
}

#[test]
fn test_auxiliary_component_accumulates_point_value() -> Result<()> {
    // A scalar component driven by a point evaluation of the function
    // component: s' = u(0, t). With u0 the slowest eigenfunction,
    // u(0, t) = exp(-lambda t) and s(t) = s0 + (1 - exp(-lambda t)) / lambda.
    let mut op = LinearOperator::new(
        vec![-1.0, 1.0],
        vec![ComponentKind::Function, ComponentKind::Auxiliary],
    );
    op.add_term(0, 0, 2, Coefficient::Constant(1.0));
    op.dirichlet(0, -1.0);
    op.dirichlet(0, 1.0);
    op.couple_functional(1, LinearFunctional::point(0, 0, 0.0, 1.0));

    let s0 = 2.0;
    let initial = BlockVector::column(vec![
        Block::Function(eigenfunction()),
        Block::Scalar(s0),
    ]);
    let time = 0.5;
    let output = propagate(&op, &[time], initial, None)?;
    let states = output.as_blocks().expect("two components");
    ensure!(states.rows() == 2 && states.cols() == 1);

    let s = states.block(1, 0).as_scalar().expect("scalar block");
    let want = s0 + (1.0 - (-LAMBDA_1 * time).exp()) / LAMBDA_1;
    ensure!(
        (s - want).abs() < ANALYTIC_TOLERANCE,
        "auxiliary value {s} vs analytic {want}"
    );

    let u = states.block(0, 0).as_function().expect("function block");
    let factor = (-LAMBDA_1 * time).exp();
    ensure!((u.evaluate(0.0) - factor).abs() < ANALYTIC_TOLERANCE);
    Ok(())
}

#[test]
fn test_unbounded_domain_is_a_fatal_configuration_error() {
    let op = heat_operator(vec![0.0, f64::INFINITY]);
    let err = propagate(&op, &[0.1], gaussian_on(0.0, 1.0), None).unwrap_err();
    assert!(err.to_string().contains("unbounded"));
}

#[test]
fn test_non_finite_generator_names_failing_time() {
    let mut op = LinearOperator::scalar(vec![-1.0, 1.0]);
    op.add_term(0, 0, 2, Coefficient::Constant(f64::NAN));
    op.dirichlet(0, -1.0);
    op.dirichlet(0, 1.0);
    let err = propagate(&op, &[0.5], gaussian(), None).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("non-finite"), "{message}");
    assert!(message.contains("0.5"), "{message}");
}

/// Gaussian on an arbitrary interval, for the error-path tests.
fn gaussian_on(a: f64, b: f64) -> PiecewiseFunction {
    let mid = 0.5 * (a + b);
    PiecewiseFunction::from_fn(a, b, move |x| (-30.0 * (x - mid) * (x - mid)).exp())
}
