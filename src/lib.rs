//! Adaptive spectral propagation of linear evolution equations.
//!
//! This crate advances an initial state through the semigroup generated by
//! a linear differential operator: given `u' = L u` with boundary
//! conditions on a bounded, possibly partitioned interval, it computes
//! `u(t) = exp(t L) u0` for a set of requested times. Functions are
//! represented as piecewise Chebyshev expansions, the operator is
//! discretized by collocation at second-kind Chebyshev points, and the
//! resolution of every subinterval is refined adaptively until the
//! computed solution's trailing coefficients certify convergence.
//!
//! Built on the [`faer`] linear algebra framework: the constraint rows
//! (boundary and continuity conditions) are eliminated exactly through an
//! SVD null-space projection, and the projected generator — in general
//! neither symmetric nor normal — is exponentiated densely by Padé
//! approximation with scaling and squaring.
//!
//! ## Pipeline
//!
//! One refinement iteration runs four stages, orchestrated per time value
//! by the driver in [`solver`]:
//!
//! 1. **Discretize** ([`algorithms::discretize`]): assemble the block
//!    collocation generator and constraint rows at the current
//!    per-subinterval resolutions.
//! 2. **Exponentiate** ([`algorithms::expm`]): project out the
//!    constraints and apply `exp(t * L)` to the sampled initial state.
//! 3. **Check** ([`algorithms::convergence`]): test trailing Chebyshev
//!    coefficients per subinterval against the tolerance.
//! 4. **Refine** ([`algorithms::resolution`]): move unresolved
//!    subintervals up the ladder of candidate sizes and repeat; resolved
//!    subintervals keep their resolution frozen.
//!
//! Exhausting the ladder is not an error: a warning is logged through the
//! [`log`] facade and the best available approximation is returned, with
//! the shortfall visible in [`solver::propagate_detailed`]'s diagnostics.
//!
//! ## Example
//!
//! Diffusion of a Gaussian bump under zero Dirichlet boundary conditions:
//!
//! ```rust
//! use chebprop::{Coefficient, LinearOperator, PiecewiseFunction, propagate};
//!
//! // Heat equation u' = u'' on [-1, 1] with u(-1) = u(1) = 0.
//! let mut operator = LinearOperator::scalar(vec![-1.0, 1.0]);
//! operator.add_term(0, 0, 2, Coefficient::Constant(1.0));
//! operator.dirichlet(0, -1.0);
//! operator.dirichlet(0, 1.0);
//!
//! // A Gaussian bump as the initial state.
//! let bump = PiecewiseFunction::from_fn(-1.0, 1.0, |x| (-30.0 * x * x).exp());
//!
//! let result = propagate(&operator, &[0.0, 0.1], bump, None)?;
//! let states = result.as_blocks().expect("one column per time");
//! assert_eq!(states.cols(), 2);
//!
//! // Diffusion damps the bump and honors the boundary conditions.
//! let later = states.block(0, 1).as_function().unwrap();
//! assert!(later.evaluate(0.0) < 1.0);
//! assert!(later.evaluate(1.0).abs() < 1e-8);
//! # Ok::<(), chebprop::PropagationError>(())
//! ```
//!
//! A single requested time with a single-component operator narrows the
//! return shape to a bare [`PiecewiseFunction`]; see
//! [`state::PropagationOutput`].

// Declare the modules that form the crate's API structure.
pub mod algorithms;
pub mod chebyshev;
pub mod error;
pub mod function;
pub mod operator;
pub mod preferences;
pub mod solver;
pub mod state;

// Re-export the main API for convenient access.
pub use error::PropagationError;
pub use function::PiecewiseFunction;
pub use operator::{
    Coefficient, ComponentKind, ContinuityCondition, FunctionalTerm, LinearFunctional,
    LinearOperator,
};
pub use preferences::Preferences;
pub use solver::{propagate, propagate_detailed, TimeDiagnostics};
pub use state::{Block, BlockVector, InitialState, PropagationOutput};
