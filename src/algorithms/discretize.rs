//! Collocation discretization of a linear operator.
//!
//! A [`Discretization`] is the cheap, mutable descriptor of the refinement
//! loop: the partition, one resolution per subinterval, and the derived
//! continuity conditions. Changing a subinterval's resolution is a plain
//! field update; all expensive matrix assembly is deferred to [`build`],
//! which produces an immutable [`DiscretizationModel`] holding the block
//! collocation generator, the constraint rows, and the forward/backward
//! maps between piecewise functions and discrete vectors.
//!
//! [`build`]: Discretization::build
//!
//! ## Degree-of-freedom layout
//!
//! The discrete unknown vector is ordered component-major: for each
//! function component, its values on every subinterval grid in partition
//! order; auxiliary scalar components follow as single trailing slots.
//! Grids are second-kind Chebyshev points, descending within each
//! subinterval, matching [`crate::chebyshev`].

use crate::chebyshev::{barycentric_row, diff_matrix, scaled_nodes};
use crate::error::{PropagationError, PropagationErrorKind};
use crate::operator::{
    ComponentKind, ContinuityCondition, LinearFunctional, LinearOperator,
};
use crate::state::Block;
use faer::{Mat, MatRef};

/// Mutable refinement descriptor for one propagation call.
#[derive(Debug)]
pub struct Discretization<'a> {
    operator: &'a LinearOperator,
    dimensions: Vec<usize>,
    continuity: Vec<ContinuityCondition>,
}

impl<'a> Discretization<'a> {
    /// Validate the operator and create a descriptor with every
    /// subinterval at `initial_dimension`.
    ///
    /// Continuity conditions are derived from the partition here, once,
    /// when the operator does not supply them. Unbounded or malformed
    /// domains and ill-typed operator terms are rejected before any
    /// numerical work.
    pub fn new(
        operator: &'a LinearOperator,
        initial_dimension: usize,
    ) -> Result<Self, PropagationError> {
        validate_operator(operator)?;
        let continuity = operator.derive_continuity();
        Ok(Self {
            operator,
            dimensions: vec![initial_dimension.max(2); operator.piece_count()],
            continuity,
        })
    }

    /// Current per-subinterval resolutions.
    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    /// Set the resolution of subinterval `piece`. Metadata only; nothing
    /// is assembled until [`build`](Self::build).
    pub fn set_dimension(&mut self, piece: usize, n: usize) {
        self.dimensions[piece] = n.max(2);
    }

    /// The continuity conditions in effect for this discretization.
    pub fn continuity(&self) -> &[ContinuityCondition] {
        &self.continuity
    }

    /// Assemble the matrix model at the current resolutions.
    pub fn build(&self) -> DiscretizationModel {
        let op = self.operator;
        let breakpoints = op.breakpoints().to_vec();
        let layout = Layout::new(op, &self.dimensions);

        // Highest derivative order appearing anywhere: differential terms,
        // constraint functionals, continuity conditions.
        let mut max_order = 0usize;
        for t in op.terms() {
            max_order = max_order.max(t.order);
        }
        for bc in op.boundary_conditions() {
            for t in &bc.terms {
                max_order = max_order.max(t.order);
            }
        }
        for fc in op.functional_rows() {
            for t in &fc.functional.terms {
                max_order = max_order.max(t.order);
            }
        }
        for c in &self.continuity {
            max_order = max_order.max(c.order);
        }

        // Per-piece node sets and scaled differentiation-matrix powers.
        let pieces: Vec<PieceGrid> = (0..layout.piece_count())
            .map(|p| {
                PieceGrid::new(
                    breakpoints[p],
                    breakpoints[p + 1],
                    self.dimensions[p],
                    max_order,
                )
            })
            .collect();

        let n = layout.size();
        let mut generator = Mat::<f64>::zeros(n, n);

        // Differential blocks, one per (term, piece).
        for term in op.terms() {
            let row_rank = layout.fun_rank(term.row);
            let col_rank = layout.fun_rank(term.col);
            for (p, grid) in pieces.iter().enumerate() {
                let r0 = layout.offset(row_rank, p);
                let c0 = layout.offset(col_rank, p);
                let d = &grid.powers[term.order];
                for (r, &x) in grid.nodes.iter().enumerate() {
                    let c_x = term.coeff.at(x);
                    if c_x == 0.0 {
                        continue;
                    }
                    for c in 0..grid.n {
                        generator[(r0 + r, c0 + c)] += c_x * d[(r, c)];
                    }
                }
            }
        }

        // Auxiliary couplings: sampled columns, functional rows, scalars.
        for src in op.scalar_sources() {
            let row_rank = layout.fun_rank(src.row);
            let col = layout.aux_offset(layout.aux_rank(src.col));
            for (p, grid) in pieces.iter().enumerate() {
                let r0 = layout.offset(row_rank, p);
                for (r, &x) in grid.nodes.iter().enumerate() {
                    generator[(r0 + r, col)] += src.coeff.at(x);
                }
            }
        }
        for fc in op.functional_rows() {
            let row = layout.aux_offset(layout.aux_rank(fc.row));
            let dense = functional_row(&fc.functional, &layout, &breakpoints, &pieces);
            for (c, v) in dense.into_iter().enumerate() {
                generator[(row, c)] += v;
            }
        }
        for st in op.scalar_terms() {
            let row = layout.aux_offset(layout.aux_rank(st.row));
            let col = layout.aux_offset(layout.aux_rank(st.col));
            generator[(row, col)] += st.value;
        }

        // Constraint rows: boundary conditions first, then continuity.
        let n_constraints = op.boundary_conditions().len() + self.continuity.len();
        let mut constraints = Mat::<f64>::zeros(n_constraints, n);
        for (i, bc) in op.boundary_conditions().iter().enumerate() {
            let dense = functional_row(bc, &layout, &breakpoints, &pieces);
            for (c, v) in dense.into_iter().enumerate() {
                constraints[(i, c)] = v;
            }
        }
        for (i, cc) in self.continuity.iter().enumerate() {
            let row = op.boundary_conditions().len() + i;
            let rank = layout.fun_rank(cc.component);
            let left = cc.breakpoint - 1;
            let right = cc.breakpoint;
            // On a descending grid the shared breakpoint is the first node
            // of the left piece and the last node of the right piece.
            let d_left = &pieces[left].powers[cc.order];
            let d_right = &pieces[right].powers[cc.order];
            let c_left = layout.offset(rank, left);
            let c_right = layout.offset(rank, right);
            for c in 0..pieces[left].n {
                constraints[(row, c_left + c)] += d_left[(0, c)];
            }
            let last = pieces[right].n - 1;
            for c in 0..pieces[right].n {
                constraints[(row, c_right + c)] -= d_right[(last, c)];
            }
        }

        let dim_adjust = layout
            .fun_components
            .iter()
            .map(|&comp| op.diff_order(comp))
            .collect();

        DiscretizationModel {
            layout,
            breakpoints,
            generator,
            constraints,
            dim_adjust,
        }
    }
}

/// Nodes and differentiation-matrix powers for one subinterval.
struct PieceGrid {
    n: usize,
    nodes: Vec<f64>,
    /// `powers[k]` is the scaled k-th derivative matrix; `powers[0] = I`.
    powers: Vec<Mat<f64>>,
}

impl PieceGrid {
    fn new(lower: f64, upper: f64, n: usize, max_order: usize) -> Self {
        let nodes = scaled_nodes(n, lower, upper);
        let scale = 2.0 / (upper - lower);
        let d1 = &diff_matrix(n) * faer::Scale(scale);
        let mut powers = Vec::with_capacity(max_order + 1);
        powers.push(Mat::<f64>::identity(n, n));
        for k in 1..=max_order {
            let next = &powers[k - 1] * &d1;
            powers.push(next);
        }
        Self { n, nodes, powers }
    }
}

/// Dense row realizing a linear functional at the current resolutions.
fn functional_row(
    functional: &LinearFunctional,
    layout: &Layout,
    breakpoints: &[f64],
    pieces: &[PieceGrid],
) -> Vec<f64> {
    let mut row = vec![0.0; layout.size()];
    for term in &functional.terms {
        // Locate the subinterval owning the evaluation point; interior
        // breakpoints resolve to the piece on their left.
        let p = pieces
            .iter()
            .enumerate()
            .position(|(p, _)| term.location <= breakpoints[p + 1])
            .unwrap_or(pieces.len() - 1);
        let grid = &pieces[p];
        let (a, b) = (breakpoints[p], breakpoints[p + 1]);
        let t = 2.0 * (term.location - a) / (b - a) - 1.0;
        let eval = barycentric_row(grid.n, t);
        let d = &grid.powers[term.order];
        let c0 = layout.offset(layout.fun_rank(term.component), p);
        for c in 0..grid.n {
            let mut acc = 0.0;
            for (r, &e) in eval.iter().enumerate() {
                acc += e * d[(r, c)];
            }
            row[c0 + c] += term.weight * acc;
        }
    }
    row
}

/// Degree-of-freedom bookkeeping shared by the model's maps.
pub(crate) struct Layout {
    dims: Vec<usize>,
    piece_offsets: Vec<usize>,
    piece_total: usize,
    fun_components: Vec<usize>,
    aux_components: Vec<usize>,
}

impl Layout {
    fn new(op: &LinearOperator, dims: &[usize]) -> Self {
        let mut piece_offsets = Vec::with_capacity(dims.len());
        let mut acc = 0;
        for &n in dims {
            piece_offsets.push(acc);
            acc += n;
        }
        let mut fun_components = Vec::new();
        let mut aux_components = Vec::new();
        for (i, kind) in op.components().iter().enumerate() {
            match kind {
                ComponentKind::Function => fun_components.push(i),
                ComponentKind::Auxiliary => aux_components.push(i),
            }
        }
        Self {
            dims: dims.to_vec(),
            piece_offsets,
            piece_total: acc,
            fun_components,
            aux_components,
        }
    }

    fn piece_count(&self) -> usize {
        self.dims.len()
    }

    /// Rank of a function component among function components.
    fn fun_rank(&self, component: usize) -> usize {
        self.fun_components
            .iter()
            .position(|&c| c == component)
            .expect("validated function component")
    }

    fn aux_rank(&self, component: usize) -> usize {
        self.aux_components
            .iter()
            .position(|&c| c == component)
            .expect("validated auxiliary component")
    }

    /// First degree of freedom of (function rank, piece).
    fn offset(&self, fun_rank: usize, piece: usize) -> usize {
        fun_rank * self.piece_total + self.piece_offsets[piece]
    }

    fn aux_offset(&self, aux_rank: usize) -> usize {
        self.fun_components.len() * self.piece_total + aux_rank
    }

    fn size(&self) -> usize {
        self.fun_components.len() * self.piece_total + self.aux_components.len()
    }
}

/// The discrete solution, partitioned back into per-component per-piece
/// value vectors plus auxiliary scalars.
pub struct PartitionedSolution {
    /// `fun_values[fun_rank][piece]` are grid values, descending order.
    pub fun_values: Vec<Vec<Vec<f64>>>,
    /// Auxiliary scalars in component order.
    pub aux_values: Vec<f64>,
}

/// Immutable matrix model at one set of resolutions.
pub struct DiscretizationModel {
    layout: Layout,
    breakpoints: Vec<f64>,
    generator: Mat<f64>,
    constraints: Mat<f64>,
    dim_adjust: Vec<usize>,
}

impl DiscretizationModel {
    /// Total number of discrete unknowns.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Number of constraint rows (boundary plus continuity).
    pub fn constraint_count(&self) -> usize {
        self.constraints.nrows()
    }

    /// The block collocation generator matrix.
    pub fn generator(&self) -> MatRef<'_, f64> {
        self.generator.as_ref()
    }

    /// The constraint rows.
    pub fn constraints(&self) -> MatRef<'_, f64> {
        self.constraints.as_ref()
    }

    /// Per-subinterval resolutions this model was assembled at.
    pub fn dimensions(&self) -> &[usize] {
        &self.layout.dims
    }

    /// The partition this model lives on.
    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    /// Indices of function components, in state order.
    pub fn function_components(&self) -> &[usize] {
        &self.layout.fun_components
    }

    /// Indices of auxiliary components, in state order.
    pub fn auxiliary_components(&self) -> &[usize] {
        &self.layout.aux_components
    }

    /// Forward map: sample a state column into the discrete vector.
    ///
    /// Function components are sampled at the subinterval resolution plus
    /// that component's differential order, then resampled down to the
    /// grid; sampling at the offset dimension keeps the discretized
    /// derivative matrices acting on data they can differentiate at full
    /// conditioning. Blocks were kind-checked at validation time.
    pub fn to_values(&self, blocks: &[Block]) -> Mat<f64> {
        let n = self.size();
        let mut v = Mat::<f64>::zeros(n, 1);
        for (rank, &comp) in self.layout.fun_components.iter().enumerate() {
            let f = blocks[comp]
                .as_function()
                .expect("validated function block");
            let adjust = self.dim_adjust[rank];
            for p in 0..self.layout.piece_count() {
                let dim = self.layout.dims[p];
                let (a, b) = (self.breakpoints[p], self.breakpoints[p + 1]);
                let sampled = f.sample(dim + adjust, a, b);
                let reduced = resample(&sampled, dim);
                let r0 = self.layout.offset(rank, p);
                for (r, &val) in reduced.iter().enumerate() {
                    v[(r0 + r, 0)] = val;
                }
            }
        }
        for (rank, &comp) in self.layout.aux_components.iter().enumerate() {
            let s = blocks[comp].as_scalar().expect("validated scalar block");
            v[(self.layout.aux_offset(rank), 0)] = s;
        }
        v
    }

    /// Backward map: partition a discrete vector into raw numeric pieces.
    pub fn from_values(&self, v: MatRef<'_, f64>) -> PartitionedSolution {
        let mut fun_values = Vec::with_capacity(self.layout.fun_components.len());
        for rank in 0..self.layout.fun_components.len() {
            let mut per_piece = Vec::with_capacity(self.layout.piece_count());
            for p in 0..self.layout.piece_count() {
                let r0 = self.layout.offset(rank, p);
                let vals = (0..self.layout.dims[p]).map(|r| v[(r0 + r, 0)]).collect();
                per_piece.push(vals);
            }
            fun_values.push(per_piece);
        }
        let aux_values = (0..self.layout.aux_components.len())
            .map(|rank| v[(self.layout.aux_offset(rank), 0)])
            .collect();
        PartitionedSolution {
            fun_values,
            aux_values,
        }
    }

    /// Normalization constants for the convergence test: the largest
    /// absolute value of each function component across all subintervals.
    pub fn scale(&self, solution: &PartitionedSolution) -> Vec<f64> {
        solution
            .fun_values
            .iter()
            .map(|per_piece| {
                per_piece
                    .iter()
                    .flatten()
                    .fold(0.0f64, |m, v| m.max(v.abs()))
            })
            .collect()
    }
}

/// Evaluate the degree-`m-1` interpolant of `values` (on the `m`-point
/// second-kind grid) at the `n`-point grid. Identity when `m == n`.
fn resample(values: &[f64], n: usize) -> Vec<f64> {
    let m = values.len();
    if m == n {
        return values.to_vec();
    }
    crate::chebyshev::chebyshev_nodes(n)
        .into_iter()
        .map(|t| {
            let row = barycentric_row(m, t);
            row.iter().zip(values.iter()).map(|(r, v)| r * v).sum()
        })
        .collect()
}

/// Reject unbounded or malformed domains and ill-typed operator terms
/// before any assembly work.
fn validate_operator(op: &LinearOperator) -> Result<(), PropagationError> {
    let breakpoints = op.breakpoints();
    if breakpoints.len() < 2 {
        return Err(PropagationErrorKind::InvalidDomain {
            reason: "fewer than two breakpoints".to_string(),
        }
        .into());
    }
    for &bp in breakpoints {
        if !bp.is_finite() {
            return Err(PropagationErrorKind::UnboundedDomain { value: bp }.into());
        }
    }
    for w in breakpoints.windows(2) {
        if w[0] >= w[1] {
            return Err(PropagationErrorKind::InvalidDomain {
                reason: format!("breakpoints {} and {} are not increasing", w[0], w[1]),
            }
            .into());
        }
    }
    let n_comp = op.components().len();
    if !op.components().contains(&ComponentKind::Function) {
        return Err(PropagationErrorKind::MalformedTerm {
            reason: "operator has no function components".to_string(),
        }
        .into());
    }
    let check_fun = |idx: usize, role: &str| -> Result<(), PropagationError> {
        if idx >= n_comp || !op.is_function_component(idx) {
            return Err(PropagationErrorKind::MalformedTerm {
                reason: format!("{role} {idx} is not a function component"),
            }
            .into());
        }
        Ok(())
    };
    let check_aux = |idx: usize, role: &str| -> Result<(), PropagationError> {
        if idx >= n_comp || op.is_function_component(idx) {
            return Err(PropagationErrorKind::MalformedTerm {
                reason: format!("{role} {idx} is not an auxiliary component"),
            }
            .into());
        }
        Ok(())
    };
    let (lower, upper) = op.domain();
    let check_functional = |f: &LinearFunctional| -> Result<(), PropagationError> {
        for t in &f.terms {
            check_fun(t.component, "functional component")?;
            if !t.location.is_finite() || t.location < lower || t.location > upper {
                return Err(PropagationErrorKind::MalformedTerm {
                    reason: format!(
                        "functional location {} lies outside the domain [{lower}, {upper}]",
                        t.location
                    ),
                }
                .into());
            }
        }
        Ok(())
    };
    for t in op.terms() {
        check_fun(t.row, "term row")?;
        check_fun(t.col, "term column")?;
    }
    for s in op.scalar_sources() {
        check_fun(s.row, "scalar-source row")?;
        check_aux(s.col, "scalar-source column")?;
    }
    for fc in op.functional_rows() {
        check_aux(fc.row, "functional row")?;
        check_functional(&fc.functional)?;
    }
    for st in op.scalar_terms() {
        check_aux(st.row, "scalar term row")?;
        check_aux(st.col, "scalar term column")?;
    }
    for bc in op.boundary_conditions() {
        check_functional(bc)?;
    }
    if let Some(explicit) = op.continuity_conditions() {
        let interior = op.piece_count().saturating_sub(1);
        for c in explicit {
            check_fun(c.component, "continuity component")?;
            if c.breakpoint == 0 || c.breakpoint > interior {
                return Err(PropagationErrorKind::MalformedTerm {
                    reason: format!(
                        "continuity breakpoint index {} is not interior",
                        c.breakpoint
                    ),
                }
                .into());
            }
        }
    }
    Ok(())
}
