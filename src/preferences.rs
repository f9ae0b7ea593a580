//! User-tunable settings for a propagation call.

/// Configuration consumed by the discretizer, the convergence tester, and
/// the refinement loop. All fields have documented process-wide defaults;
/// `Preferences::default()` is what `propagate` uses when the caller
/// passes none.
#[derive(Clone, Debug, PartialEq)]
pub struct Preferences {
    /// Relative tolerance for the trailing-coefficient convergence test.
    pub tolerance: f64,
    /// The ladder of per-subinterval discretization sizes tried in order.
    /// Must be strictly increasing.
    pub dimension_values: Vec<usize>,
    /// Whether to merge adjacent smooth pieces of a multi-piece result for
    /// strictly positive times. Propagated solutions of the equations this
    /// crate targets are smooth for `t > 0`; this is a policy, not a
    /// detected property.
    pub merge_pieces: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            // Nested second-kind grids: each step roughly doubles.
            dimension_values: vec![17, 33, 65, 129, 257, 513, 1025],
            merge_pieces: true,
        }
    }
}

impl Preferences {
    /// Largest size the ladder permits.
    pub fn max_dimension(&self) -> usize {
        self.dimension_values.iter().copied().max().unwrap_or(1)
    }
}
