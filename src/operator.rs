//! The linear operator abstraction consumed by the propagation driver.
//!
//! A [`LinearOperator`] describes the generator `L` of the evolution
//! equation `u' = L u` on a partitioned interval: which components the
//! state has, how the components couple through differential terms with
//! constant or variable coefficients, and which boundary and continuity
//! constraints pin down the semigroup. The operator is purely descriptive;
//! all numerical work happens in the discretizer, which reads it through
//! the accessors defined here.
//!
//! Components come in two kinds. `Function` components are unknowns that
//! live on the collocation grid and are subject to adaptive convergence
//! testing. `Auxiliary` components are scalar unknowns riding along in the
//! same generator; they couple to function components through three
//! restricted forms (sampled coefficient columns, point-evaluation
//! functional rows, and plain scalar entries) and have no notion of
//! spectral convergence.

use std::fmt;
use std::sync::Arc;

/// Whether a component of the state is a grid function or a bare scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    /// A function of the spatial variable, discretized per subinterval and
    /// convergence-tested.
    Function,
    /// A scalar unknown; one degree of freedom, excluded from convergence
    /// testing.
    Auxiliary,
}

/// A coefficient in a differential term or scalar-source coupling.
#[derive(Clone)]
pub enum Coefficient {
    /// A constant multiplier.
    Constant(f64),
    /// A spatially varying multiplier, evaluated at collocation nodes.
    Variable(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Coefficient {
    /// Evaluate the coefficient at `x`.
    pub fn at(&self, x: f64) -> f64 {
        match self {
            Coefficient::Constant(c) => *c,
            Coefficient::Variable(f) => f(x),
        }
    }

    /// Wrap a closure as a variable coefficient.
    pub fn variable(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Coefficient::Variable(Arc::new(f))
    }
}

impl fmt::Debug for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coefficient::Constant(c) => write!(f, "Constant({c})"),
            Coefficient::Variable(_) => write!(f, "Variable(..)"),
        }
    }
}

/// One differential term `c(x) * d^order u_col / dx^order` contributing to
/// the equation of component `row`.
#[derive(Clone, Debug)]
pub struct DifferentialTerm {
    pub row: usize,
    pub col: usize,
    pub order: usize,
    pub coeff: Coefficient,
}

/// A scalar auxiliary unknown feeding a function equation: contributes
/// `c(x) * s_col` to the equation of function component `row`.
#[derive(Clone, Debug)]
pub struct ScalarSource {
    pub row: usize,
    pub col: usize,
    pub coeff: Coefficient,
}

/// One term of a linear functional: `weight * d^order u_component / dx^order`
/// evaluated at `location`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FunctionalTerm {
    pub component: usize,
    pub order: usize,
    pub location: f64,
    pub weight: f64,
}

/// A linear functional on the function components, with implicit target
/// value zero. Used both for boundary conditions and for the right-hand
/// side of auxiliary equations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearFunctional {
    pub terms: Vec<FunctionalTerm>,
}

impl LinearFunctional {
    /// A functional with a single point-evaluation term.
    pub fn point(component: usize, order: usize, location: f64, weight: f64) -> Self {
        Self {
            terms: vec![FunctionalTerm {
                component,
                order,
                location,
                weight,
            }],
        }
    }
}

/// The equation of an auxiliary component: `s_row' = functional(u) + ...`.
#[derive(Clone, Debug)]
pub struct FunctionalCoupling {
    pub row: usize,
    pub functional: LinearFunctional,
}

/// A scalar-to-scalar generator entry between auxiliary components.
#[derive(Clone, Copy, Debug)]
pub struct ScalarTerm {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// A continuity condition across one interior breakpoint: the `order`-th
/// derivative of function component `component` matches from the left and
/// the right at breakpoint index `breakpoint` (1-based among interior
/// breakpoints of the partition).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContinuityCondition {
    pub component: usize,
    pub order: usize,
    pub breakpoint: usize,
}

/// A linear differential operator on a partitioned bounded interval.
#[derive(Clone, Debug)]
pub struct LinearOperator {
    breakpoints: Vec<f64>,
    components: Vec<ComponentKind>,
    terms: Vec<DifferentialTerm>,
    scalar_sources: Vec<ScalarSource>,
    functional_rows: Vec<FunctionalCoupling>,
    scalar_terms: Vec<ScalarTerm>,
    boundary_conditions: Vec<LinearFunctional>,
    continuity: Option<Vec<ContinuityCondition>>,
}

impl LinearOperator {
    /// An operator with the given partition and component kinds, initially
    /// with no terms and no constraints. Domain validity is checked when
    /// the operator is handed to `propagate`, not here.
    pub fn new(breakpoints: Vec<f64>, components: Vec<ComponentKind>) -> Self {
        Self {
            breakpoints,
            components,
            terms: Vec::new(),
            scalar_sources: Vec::new(),
            functional_rows: Vec::new(),
            scalar_terms: Vec::new(),
            boundary_conditions: Vec::new(),
            continuity: None,
        }
    }

    /// The common case: a single function unknown on the given partition.
    pub fn scalar(breakpoints: Vec<f64>) -> Self {
        Self::new(breakpoints, vec![ComponentKind::Function])
    }

    /// Add `coeff(x) * d^order u_col / dx^order` to the equation of
    /// function component `row`.
    pub fn add_term(&mut self, row: usize, col: usize, order: usize, coeff: Coefficient) {
        self.terms.push(DifferentialTerm {
            row,
            col,
            order,
            coeff,
        });
    }

    /// Couple auxiliary component `col` into the equation of function
    /// component `row` with the sampled coefficient `coeff(x)`.
    pub fn couple_scalar_source(&mut self, row: usize, col: usize, coeff: Coefficient) {
        self.scalar_sources.push(ScalarSource { row, col, coeff });
    }

    /// Set the equation of auxiliary component `row` to the given
    /// functional of the function components.
    pub fn couple_functional(&mut self, row: usize, functional: LinearFunctional) {
        self.functional_rows.push(FunctionalCoupling { row, functional });
    }

    /// Add a scalar generator entry between auxiliary components.
    pub fn couple_scalar(&mut self, row: usize, col: usize, value: f64) {
        self.scalar_terms.push(ScalarTerm { row, col, value });
    }

    /// Append a boundary-condition functional (target value zero).
    pub fn add_boundary_condition(&mut self, functional: LinearFunctional) {
        self.boundary_conditions.push(functional);
    }

    /// Zero Dirichlet condition on `component` at `location`.
    pub fn dirichlet(&mut self, component: usize, location: f64) {
        self.add_boundary_condition(LinearFunctional::point(component, 0, location, 1.0));
    }

    /// Zero Neumann condition on `component` at `location`.
    pub fn neumann(&mut self, component: usize, location: f64) {
        self.add_boundary_condition(LinearFunctional::point(component, 1, location, 1.0));
    }

    /// Supply explicit continuity conditions, overriding the default
    /// derivation from differential orders.
    pub fn set_continuity(&mut self, conditions: Vec<ContinuityCondition>) {
        self.continuity = Some(conditions);
    }

    /// Domain endpoints `(lower, upper)`.
    pub fn domain(&self) -> (f64, f64) {
        (
            self.breakpoints.first().copied().unwrap_or(f64::NAN),
            self.breakpoints.last().copied().unwrap_or(f64::NAN),
        )
    }

    /// The full breakpoint list defining the partition.
    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    /// Number of subintervals in the partition.
    pub fn piece_count(&self) -> usize {
        self.breakpoints.len().saturating_sub(1)
    }

    /// Component kinds, in state order.
    pub fn components(&self) -> &[ComponentKind] {
        &self.components
    }

    /// Whether component `index` is a grid function.
    pub fn is_function_component(&self, index: usize) -> bool {
        matches!(self.components.get(index), Some(ComponentKind::Function))
    }

    /// Boundary-condition functionals.
    pub fn boundary_conditions(&self) -> &[LinearFunctional] {
        &self.boundary_conditions
    }

    /// Explicit continuity conditions, when the caller supplied any.
    pub fn continuity_conditions(&self) -> Option<&[ContinuityCondition]> {
        self.continuity.as_deref()
    }

    pub(crate) fn terms(&self) -> &[DifferentialTerm] {
        &self.terms
    }

    pub(crate) fn scalar_sources(&self) -> &[ScalarSource] {
        &self.scalar_sources
    }

    pub(crate) fn functional_rows(&self) -> &[FunctionalCoupling] {
        &self.functional_rows
    }

    pub(crate) fn scalar_terms(&self) -> &[ScalarTerm] {
        &self.scalar_terms
    }

    /// Highest derivative order applied to function component `col`
    /// anywhere in the operator. Zero for components never differentiated.
    pub fn diff_order(&self, col: usize) -> usize {
        self.terms
            .iter()
            .filter(|t| t.col == col)
            .map(|t| t.order)
            .max()
            .unwrap_or(0)
    }

    /// Continuity conditions in effect: the explicit list when supplied,
    /// otherwise one condition per interior breakpoint, function
    /// component, and derivative order below that component's differential
    /// order.
    pub fn derive_continuity(&self) -> Vec<ContinuityCondition> {
        if let Some(explicit) = &self.continuity {
            return explicit.clone();
        }
        let mut conditions = Vec::new();
        let interior = self.piece_count().saturating_sub(1);
        for bp in 1..=interior {
            for (component, kind) in self.components.iter().enumerate() {
                if *kind != ComponentKind::Function {
                    continue;
                }
                for order in 0..self.diff_order(component) {
                    conditions.push(ContinuityCondition {
                        component,
                        order,
                        breakpoint: bp,
                    });
                }
            }
        }
        conditions
    }
}
