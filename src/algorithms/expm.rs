//! The matrix-exponential engine.
//!
//! Given a discretization model and a time value, [`exponentiate`]
//! produces the discrete semigroup action as a [`Propagator`] pair: an
//! orthonormal basis `B` of the constraint null space and the dense
//! exponential `exp(t * Bᵀ A B)` of the generator projected onto that
//! subspace. Applying the pair advances a discrete state while satisfying
//! every boundary and continuity row exactly, since the advanced vector
//! lives in the span of `B` by construction.
//!
//! The dense exponential itself is computed by diagonal Padé approximation
//! with scaling and squaring (Higham, *The Scaling and Squaring Method for
//! the Matrix Exponential Revisited*, 2005). The projected generator of a
//! collocation discretization is neither symmetric nor normal, so nothing
//! here assumes either; the Padé solves use partial-pivoting LU.

use crate::algorithms::discretize::DiscretizationModel;
use crate::error::{PropagationError, PropagationErrorKind};
use faer::prelude::*;
use faer::{Mat, MatRef, Scale};

// Padé numerator coefficients for degrees 3, 5, 7, 9, 13, and the
// corresponding 1-norm switching thresholds from Higham (2005), Table 2.3.
const PADE3: [f64; 4] = [120.0, 60.0, 12.0, 1.0];
const PADE5: [f64; 6] = [30240.0, 15120.0, 3360.0, 420.0, 30.0, 1.0];
const PADE7: [f64; 8] = [
    17_297_280.0,
    8_648_640.0,
    1_995_840.0,
    277_200.0,
    25_200.0,
    1_512.0,
    56.0,
    1.0,
];
const PADE9: [f64; 10] = [
    17_643_225_600.0,
    8_821_612_800.0,
    2_075_673_600.0,
    302_702_400.0,
    30_270_240.0,
    2_162_160.0,
    110_880.0,
    3_960.0,
    90.0,
    1.0,
];
const PADE13: [f64; 14] = [
    64_764_752_532_480_000.0,
    32_382_376_266_240_000.0,
    7_771_770_303_897_600.0,
    1_187_353_796_428_800.0,
    129_060_195_264_000.0,
    10_559_470_521_600.0,
    670_442_572_800.0,
    33_522_128_640.0,
    1_323_241_920.0,
    40_840_800.0,
    960_960.0,
    16_380.0,
    182.0,
    1.0,
];

const THETA3: f64 = 1.495585217958292e-2;
const THETA5: f64 = 2.539398330063230e-1;
const THETA7: f64 = 9.504178996162932e-1;
const THETA9: f64 = 2.097847961257068;
const THETA13: f64 = 5.371920351148152;

/// The discrete semigroup action at one (discretization, time) pair.
///
/// `core` is the exponential of the reduced generator; `basis` maps the
/// reduced coordinates back to the full unknown vector, recovering the
/// degrees of freedom eliminated by the constraints.
#[derive(Debug)]
pub struct Propagator {
    core: Mat<f64>,
    basis: Mat<f64>,
}

impl Propagator {
    /// The identity action on `n` unknowns, the degenerate `t == 0` case.
    pub fn identity(n: usize) -> Self {
        Self {
            core: Mat::<f64>::identity(n, n),
            basis: Mat::<f64>::identity(n, n),
        }
    }

    /// Advance a full discrete state: project onto the constraint null
    /// space, apply the exponential, and map back.
    pub fn apply(&self, v0: MatRef<'_, f64>) -> Mat<f64> {
        let reduced = self.basis.as_ref().transpose() * v0;
        let advanced = &self.core * &reduced;
        &self.basis * &advanced
    }

    /// The reduced exponential matrix.
    pub fn core(&self) -> MatRef<'_, f64> {
        self.core.as_ref()
    }

    /// The null-space basis (projection/back-substitution matrix).
    pub fn basis(&self) -> MatRef<'_, f64> {
        self.basis.as_ref()
    }
}

/// Build the propagator for `exp(time * L)` at the model's resolution.
///
/// Callers short-circuit `time == 0` (the initial condition is already
/// the answer); the identity propagator returned here for that input is a
/// defensive fallback, not a supported path through the exponential.
pub fn exponentiate(
    model: &DiscretizationModel,
    time: f64,
) -> Result<Propagator, PropagationError> {
    let n = model.size();
    if time == 0.0 {
        return Ok(Propagator::identity(n));
    }
    let basis = null_space_basis(model.constraints())?;
    if basis.ncols() == 0 {
        return Err(PropagationErrorKind::OverConstrained {
            dimension: n,
            constraints: model.constraint_count(),
        }
        .into());
    }
    let projected = basis.as_ref().transpose() * model.generator();
    let reduced = projected * basis.as_ref();
    let scaled = &reduced * Scale(time);
    let core = expm(scaled.as_ref());
    if !all_finite(core.as_ref()) {
        return Err(PropagationErrorKind::NonFiniteExponential { time, dimension: n }.into());
    }
    Ok(Propagator { core, basis })
}

/// Orthonormal basis of the null space of the constraint rows, via the
/// full SVD. With no constraint rows the basis is the identity.
fn null_space_basis(c: MatRef<'_, f64>) -> Result<Mat<f64>, PropagationError> {
    let cols = c.ncols();
    if c.nrows() == 0 {
        return Ok(Mat::<f64>::identity(cols, cols));
    }
    let svd = c
        .svd()
        .map_err(|e| PropagationError::from(PropagationErrorKind::SvdError(e)))?;
    let s = svd.S();
    let k = c.nrows().min(cols);
    let smax = if k > 0 { s[0] } else { 0.0 };
    let tol = smax * cols as f64 * f64::EPSILON;
    let rank = (0..k).take_while(|&i| s[i] > tol).count();
    Ok(svd.V().get(.., rank..cols).to_owned())
}

/// Dense matrix exponential by Padé approximation with scaling and
/// squaring. Non-finite input propagates to non-finite output rather than
/// panicking; callers are expected to check.
pub fn expm(a: MatRef<'_, f64>) -> Mat<f64> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "matrix exponential needs a square matrix");
    if n == 0 {
        return Mat::zeros(0, 0);
    }
    let norm = one_norm(a);
    if norm <= THETA3 {
        return pade_small(a, &PADE3);
    }
    if norm <= THETA5 {
        return pade_small(a, &PADE5);
    }
    if norm <= THETA7 {
        return pade_small(a, &PADE7);
    }
    if norm <= THETA9 {
        return pade_small(a, &PADE9);
    }
    let mut s: i32 = 0;
    if norm > THETA13 {
        s = (norm / THETA13).log2().ceil() as i32;
    }
    let scaled = a * Scale(0.5f64.powi(s));
    let mut x = pade13(scaled.as_ref());
    for _ in 0..s {
        x = &x * &x;
    }
    x
}

/// Diagonal Padé approximant of degree 3, 5, 7 or 9, evaluated from even
/// powers of `a`. The odd/even split gives the numerator and denominator
/// as `V + U` and `V - U` for a single LU solve.
fn pade_small(a: MatRef<'_, f64>, b: &[f64]) -> Mat<f64> {
    let n = a.nrows();
    let id = Mat::<f64>::identity(n, n);
    let a2 = a * a;
    let mut u_inner = &id * Scale(b[1]);
    let mut v = &id * Scale(b[0]);
    let mut pow = a2.clone();
    let mut i = 2;
    while i < b.len() {
        let vt = &pow * Scale(b[i]);
        v = &v + &vt;
        if i + 1 < b.len() {
            let ut = &pow * Scale(b[i + 1]);
            u_inner = &u_inner + &ut;
        }
        if i + 2 < b.len() {
            pow = &pow * &a2;
        }
        i += 2;
    }
    let u = a * &u_inner;
    solve_pade(&u, &v)
}

/// Degree-13 approximant with the factored evaluation scheme of Higham
/// (2005), using only `A^2`, `A^4` and `A^6`.
fn pade13(a: MatRef<'_, f64>) -> Mat<f64> {
    let b = &PADE13;
    let n = a.nrows();
    let id = Mat::<f64>::identity(n, n);
    let a2 = a * a;
    let a4 = &a2 * &a2;
    let a6 = &a2 * &a4;

    let mut w = &a6 * Scale(b[13]);
    w = &w + &(&a4 * Scale(b[11]));
    w = &w + &(&a2 * Scale(b[9]));
    let mut u_inner = &a6 * &w;
    u_inner = &u_inner + &(&a6 * Scale(b[7]));
    u_inner = &u_inner + &(&a4 * Scale(b[5]));
    u_inner = &u_inner + &(&a2 * Scale(b[3]));
    u_inner = &u_inner + &(&id * Scale(b[1]));
    let u = a * &u_inner;

    let mut z = &a6 * Scale(b[12]);
    z = &z + &(&a4 * Scale(b[10]));
    z = &z + &(&a2 * Scale(b[8]));
    let mut v = &a6 * &z;
    v = &v + &(&a6 * Scale(b[6]));
    v = &v + &(&a4 * Scale(b[4]));
    v = &v + &(&a2 * Scale(b[2]));
    v = &v + &(&id * Scale(b[0]));

    solve_pade(&u, &v)
}

/// `(V - U)^{-1} (V + U)` by partial-pivoting LU.
fn solve_pade(u: &Mat<f64>, v: &Mat<f64>) -> Mat<f64> {
    let lhs = v - u;
    let rhs = v + u;
    lhs.partial_piv_lu().solve(&rhs)
}

/// Operator 1-norm: the maximum absolute column sum.
fn one_norm(a: MatRef<'_, f64>) -> f64 {
    let mut max = 0.0f64;
    for j in 0..a.ncols() {
        let mut col = 0.0;
        for i in 0..a.nrows() {
            col += a[(i, j)].abs();
        }
        max = max.max(col);
    }
    max
}

/// Whether every entry is finite.
pub(crate) fn all_finite(a: MatRef<'_, f64>) -> bool {
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            if !a[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::discretize::Discretization;
    use crate::operator::{Coefficient, LinearOperator};
    use crate::state::Block;
    use faer::mat;

    #[test]
    fn test_expm_of_zero_is_identity() {
        let a = Mat::<f64>::zeros(4, 4);
        let e = expm(a.as_ref());
        for i in 0..4 {
            for j in 0..4 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((e[(i, j)] - want).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn test_expm_diagonal() {
        let a = mat![[1.0, 0.0], [0.0, -2.0]];
        let e = expm(a.as_ref());
        assert!((e[(0, 0)] - 1.0f64.exp()).abs() < 1e-13);
        assert!((e[(1, 1)] - (-2.0f64).exp()).abs() < 1e-14);
        assert!(e[(0, 1)].abs() < 1e-15);
        assert!(e[(1, 0)].abs() < 1e-15);
    }

    #[test]
    fn test_expm_nilpotent() {
        // exp([[0,1],[0,0]]) = [[1,1],[0,1]] exactly.
        let a = mat![[0.0, 1.0], [0.0, 0.0]];
        let e = expm(a.as_ref());
        assert!((e[(0, 0)] - 1.0).abs() < 1e-15);
        assert!((e[(0, 1)] - 1.0).abs() < 1e-14);
        assert!(e[(1, 0)].abs() < 1e-15);
        assert!((e[(1, 1)] - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_expm_rotation_is_not_symmetric() {
        // exp of a skew matrix is a rotation; exercises the degree-9 branch
        // with a genuinely non-symmetric argument.
        let theta = 1.3f64;
        let a = mat![[0.0, -theta], [theta, 0.0]];
        let e = expm(a.as_ref());
        assert!((e[(0, 0)] - theta.cos()).abs() < 1e-13);
        assert!((e[(0, 1)] + theta.sin()).abs() < 1e-13);
        assert!((e[(1, 0)] - theta.sin()).abs() < 1e-13);
        assert!((e[(1, 1)] - theta.cos()).abs() < 1e-13);
    }

    #[test]
    fn test_expm_heavy_scaling() {
        // Large norm forces many squarings; the scalar case has an exact
        // answer to compare against in relative terms.
        let a = mat![[-50.0]];
        let e = expm(a.as_ref());
        let want = (-50.0f64).exp();
        assert!((e[(0, 0)] - want).abs() / want < 1e-9);
    }

    #[test]
    fn test_expm_semigroup_property() {
        let a = mat![[0.3, 1.1, 0.0], [-0.4, 0.2, 0.7], [0.0, -0.9, -0.5]];
        let half = &a * Scale(0.5);
        let e_full = expm(a.as_ref());
        let e_half = expm(half.as_ref());
        let squared = &e_half * &e_half;
        for i in 0..3 {
            for j in 0..3 {
                assert!((squared[(i, j)] - e_full[(i, j)]).abs() < 1e-12);
            }
        }
    }

    fn heat_model(n: usize) -> crate::algorithms::discretize::DiscretizationModel {
        let mut op = LinearOperator::scalar(vec![-1.0, 1.0]);
        op.add_term(0, 0, 2, Coefficient::Constant(1.0));
        op.dirichlet(0, -1.0);
        op.dirichlet(0, 1.0);
        Discretization::new(&op, n).unwrap().build()
    }

    #[test]
    fn test_exponentiate_zero_time_is_identity() {
        let model = heat_model(10);
        let prop = exponentiate(&model, 0.0).unwrap();
        let v0 = Mat::<f64>::from_fn(model.size(), 1, |i, _| i as f64 - 3.0);
        let v = prop.apply(v0.as_ref());
        for i in 0..model.size() {
            assert_eq!(v[(i, 0)], v0[(i, 0)]);
        }
    }

    #[test]
    fn test_propagated_vector_satisfies_constraints() {
        let model = heat_model(14);
        let prop = exponentiate(&model, 0.05).unwrap();
        let bump = crate::function::PiecewiseFunction::from_fn(-1.0, 1.0, |x: f64| {
            (-20.0 * x * x).exp()
        });
        let v0 = model.to_values(&[Block::Function(bump)]);
        let v = prop.apply(v0.as_ref());
        let residual = model.constraints() * v.as_ref();
        for i in 0..model.constraint_count() {
            assert!(
                residual[(i, 0)].abs() < 1e-12,
                "constraint {i} residual {}",
                residual[(i, 0)]
            );
        }
    }

    #[test]
    fn test_exponentiate_rejects_non_finite_generator() {
        let mut op = LinearOperator::scalar(vec![-1.0, 1.0]);
        op.add_term(0, 0, 2, Coefficient::Constant(f64::NAN));
        op.dirichlet(0, -1.0);
        op.dirichlet(0, 1.0);
        let disc = Discretization::new(&op, 8).unwrap();
        let model = disc.build();
        let err = exponentiate(&model, 0.5).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        assert!(err.to_string().contains("0.5"));
    }
}
