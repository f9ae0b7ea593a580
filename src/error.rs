//! This module defines the custom error types for the library.
//!
//! All failure conditions that can arise while discretizing an operator and
//! propagating a state through its semigroup are centralized in a single
//! enum wrapped by [`PropagationError`].
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types
//! with minimal boilerplate. Note that [`faer::linalg::svd::SvdError`] does
//! not implement the standard [`std::error::Error`] trait, so we wrap it
//! manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can occur during a propagation call.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct PropagationError(#[from] PropagationErrorKind);

/// Private enum containing the distinct kinds of errors.
/// This separation allows for a clean `Display` implementation via
/// [`thiserror`] while handling non-standard error types manually.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum PropagationErrorKind {
    /// The operator's domain contains a non-finite breakpoint. An unbounded
    /// interval cannot be discretized by a bounded collocation grid.
    #[error("Operator domain is unbounded: breakpoint {value} is not finite.")]
    UnboundedDomain { value: f64 },

    /// The operator's breakpoint list is not a valid partition.
    #[error("Invalid operator domain: {reason}")]
    InvalidDomain { reason: String },

    /// Propagation times must be non-negative and finite.
    #[error("Invalid propagation time {value}: times must be finite and non-negative.")]
    InvalidTime { value: f64 },

    /// The initial state's block count does not match the operator's
    /// component count.
    #[error("Initial state has {actual} blocks but the operator defines {expected} components.")]
    BlockCountMismatch { expected: usize, actual: usize },

    /// A block of the initial state has the wrong kind for its component
    /// (a function block for an auxiliary component, or vice versa).
    #[error(
        "Initial-state block {index} does not match the operator's component kind at that position."
    )]
    BlockKindMismatch { index: usize },

    /// A function block of the initial state lives on a different interval
    /// than the operator.
    #[error(
        "Initial-state block {index} is defined on [{got_lower}, {got_upper}] but the operator domain is [{lower}, {upper}]."
    )]
    DomainMismatch {
        index: usize,
        got_lower: f64,
        got_upper: f64,
        lower: f64,
        upper: f64,
    },

    /// An operator term references a component that does not exist or has
    /// the wrong kind for that coupling form.
    #[error("Malformed operator term: {reason}")]
    MalformedTerm { reason: String },

    /// The preferences supply no candidate discretization sizes at all.
    #[error("Preferences supply no candidate dimensions; the resolution ladder is empty.")]
    EmptyLadder,

    /// The constraint rows leave no degrees of freedom at the current
    /// discretization size, so no reduced generator exists.
    #[error(
        "Constraints eliminate all {dimension} degrees of freedom ({constraints} constraint rows); the discretization is too coarse for this operator."
    )]
    OverConstrained {
        dimension: usize,
        constraints: usize,
    },

    /// The matrix exponential produced NaN or infinite entries. The result
    /// is not silently substituted; the failing time and discretization
    /// size are reported instead.
    #[error(
        "Matrix exponential produced a non-finite result at time {time} (discretization size {dimension})."
    )]
    NonFiniteExponential { time: f64, dimension: usize },

    /// Wraps an error originating from [`faer`]'s singular value
    /// decomposition, used to compute the constraint null space.
    #[error("A numerical error occurred while computing the constraint null space: {0:?}")]
    SvdError(faer::linalg::svd::SvdError),
}

// Manually implement PartialEq for the public error type.
// We compare the inner `PropagationErrorKind`.
impl PartialEq for PropagationError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
