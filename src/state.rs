//! Heterogeneous state containers for multi-component propagation.
//!
//! A [`BlockVector`] is a small block matrix whose entries are either
//! piecewise functions or scalars: rows are state components, columns are
//! requested time points. Storage is column-major and columns are appended
//! whole, so assembling results across a time loop never reallocates
//! per-block.

use crate::function::PiecewiseFunction;

/// One entry of a block vector: a function of space, or a bare scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Function(PiecewiseFunction),
    Scalar(f64),
}

impl Block {
    /// The contained function, if this is a function block.
    pub fn as_function(&self) -> Option<&PiecewiseFunction> {
        match self {
            Block::Function(f) => Some(f),
            Block::Scalar(_) => None,
        }
    }

    /// The contained scalar, if this is a scalar block.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Block::Function(_) => None,
            Block::Scalar(s) => Some(*s),
        }
    }
}

impl From<PiecewiseFunction> for Block {
    fn from(f: PiecewiseFunction) -> Self {
        Block::Function(f)
    }
}

impl From<f64> for Block {
    fn from(s: f64) -> Self {
        Block::Scalar(s)
    }
}

/// A block matrix of heterogeneous entries with `rows` components and one
/// column per time point, stored column-major.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockVector {
    rows: usize,
    blocks: Vec<Block>,
}

impl BlockVector {
    /// An empty container expecting columns of height `rows`, with space
    /// reserved for `expected_cols` columns.
    pub fn with_capacity(rows: usize, expected_cols: usize) -> Self {
        Self {
            rows,
            blocks: Vec::with_capacity(rows * expected_cols),
        }
    }

    /// A single-column vector from an ordered list of blocks.
    pub fn column(blocks: Vec<Block>) -> Self {
        Self {
            rows: blocks.len(),
            blocks,
        }
    }

    /// Append one column.
    ///
    /// # Panics
    ///
    /// Panics when the column height does not match `rows`.
    pub fn push_column(&mut self, column: Vec<Block>) {
        assert_eq!(
            column.len(),
            self.rows,
            "column height {} does not match block vector rows {}",
            column.len(),
            self.rows
        );
        self.blocks.extend(column);
    }

    /// Number of component rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (time points).
    pub fn cols(&self) -> usize {
        if self.rows == 0 {
            0
        } else {
            self.blocks.len() / self.rows
        }
    }

    /// Total number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the container holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block at component `row`, time column `col`.
    pub fn block(&self, row: usize, col: usize) -> &Block {
        &self.blocks[col * self.rows + row]
    }

    /// Iterate over the blocks of column `col` in component order.
    pub fn column_blocks(&self, col: usize) -> &[Block] {
        &self.blocks[col * self.rows..(col + 1) * self.rows]
    }

    /// Iterate over all blocks, column-major.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Consume into the sole block of a 1x1 container.
    pub fn into_single(mut self) -> Option<Block> {
        if self.rows == 1 && self.blocks.len() == 1 {
            self.blocks.pop()
        } else {
            None
        }
    }
}

/// The initial state of a propagation call, resolved once at validation
/// time: a bare function is wrapped into a one-block vector.
#[derive(Clone, Debug, PartialEq)]
pub enum InitialState {
    Function(PiecewiseFunction),
    Blocks(BlockVector),
}

impl InitialState {
    /// View as a single-column list of blocks, wrapping a bare function.
    pub(crate) fn to_column(&self) -> Vec<Block> {
        match self {
            InitialState::Function(f) => vec![Block::Function(f.clone())],
            InitialState::Blocks(v) => v.column_blocks(0).to_vec(),
        }
    }
}

impl From<PiecewiseFunction> for InitialState {
    fn from(f: PiecewiseFunction) -> Self {
        InitialState::Function(f)
    }
}

impl From<BlockVector> for InitialState {
    fn from(v: BlockVector) -> Self {
        InitialState::Blocks(v)
    }
}

/// The result of a propagation call. The shape narrows to a bare function
/// exactly when both the operator output and the time sequence are
/// singletons; otherwise the full block container is returned.
#[derive(Clone, Debug, PartialEq)]
pub enum PropagationOutput {
    Function(PiecewiseFunction),
    Blocks(BlockVector),
}

impl PropagationOutput {
    /// The bare function, when the shape collapsed to one.
    pub fn as_function(&self) -> Option<&PiecewiseFunction> {
        match self {
            PropagationOutput::Function(f) => Some(f),
            PropagationOutput::Blocks(_) => None,
        }
    }

    /// The block container, when the shape did not collapse.
    pub fn as_blocks(&self) -> Option<&BlockVector> {
        match self {
            PropagationOutput::Function(_) => None,
            PropagationOutput::Blocks(v) => Some(v),
        }
    }

    /// Consume into a block container, wrapping a collapsed function back
    /// into a 1x1 block vector.
    pub fn into_blocks(self) -> BlockVector {
        match self {
            PropagationOutput::Function(f) => BlockVector::column(vec![Block::Function(f)]),
            PropagationOutput::Blocks(v) => v,
        }
    }
}
