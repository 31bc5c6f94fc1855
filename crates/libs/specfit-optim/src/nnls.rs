//! Non-negative least squares (Lawson-Hanson active set method).
//!
//! The solver works on the premultiplied form `AᵀA x = Aᵀb`, which is what
//! the reflectance accumulators produce. Linear equality constraints can be
//! appended to the premultiplied system as extra rows and columns (see
//! [`solve_premultiplied_with_equality_constraints`]); their Lagrange
//! multipliers are returned after the regular unknowns.

use nalgebra::{DMatrix, DVector};

/// Errors raised by the NNLS solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NnlsError {
    /// The premultiplied matrix is not square.
    #[error("A'A must be a square matrix, got {rows}x{cols}")]
    NotSquare {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },
    /// The right-hand side does not match the matrix.
    #[error("A'b must have {expected} rows, got {actual}")]
    DimensionMismatch {
        /// Expected number of rows.
        expected: usize,
        /// Actual number of rows.
        actual: usize,
    },
    /// More constraints than unknowns.
    #[error("{constraints} equality constraints requested for a system of size {size}")]
    TooManyConstraints {
        /// Number of constraints.
        constraints: usize,
        /// Size of the system.
        size: usize,
    },
    /// The termination tolerance is not strictly positive.
    #[error("Epsilon must be greater than zero, got {0}")]
    InvalidTolerance(f64),
    /// The restriction of the system to the free variables is singular.
    #[error("Singular system restricted to {free} free variables")]
    Singular {
        /// Number of free variables (including constraints) of the failing
        /// sub-system.
        free: usize,
    },
    /// The solution contains NaN or infinite values.
    #[error("Non-finite value in the NNLS solution")]
    NonFinite,
}

/// Solves `min ||Ax - b||²` subject to `x ≥ 0`.
pub fn solve(a: &DMatrix<f64>, b: &DVector<f64>, epsilon: f64) -> Result<DVector<f64>, NnlsError> {
    if b.len() != a.nrows() {
        return Err(NnlsError::DimensionMismatch {
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    let ata = a.tr_mul(a);
    let atb = a.tr_mul(b);
    solve_premultiplied(&ata, &atb, epsilon)
}

/// Solves `min ||Ax - b||²` subject to `x ≥ 0` given `AᵀA` and `Aᵀb`.
pub fn solve_premultiplied(
    ata: &DMatrix<f64>,
    atb: &DVector<f64>,
    epsilon: f64,
) -> Result<DVector<f64>, NnlsError> {
    solve_premultiplied_with_equality_constraints(ata, atb, epsilon, 0)
}

/// Solves a non-negative least squares problem with additional linear
/// equality constraints.
///
/// # Arguments
///
/// * `augmented_ata` - Square matrix whose upper-left block is `AᵀA`. The
///   last `constraint_count` rows hold the left-hand sides of the equality
///   constraints, mirrored in the last columns; the lower-right block is
///   zero.
/// * `augmented_atb` - `Aᵀb` followed by the right-hand sides of the
///   constraints.
/// * `epsilon` - Termination tolerance on the gradient; must be positive.
/// * `constraint_count` - Number of trailing rows/columns that are
///   constraints.
///
/// Returns the non-negative solution followed by the Lagrange multipliers of
/// the constraints.
///
/// A restricted system that turns singular during the iterations is an
/// error ([`NnlsError::Singular`]); no partial solution is returned. Inputs
/// containing NaN or infinite values are rejected with
/// [`NnlsError::NonFinite`].
pub fn solve_premultiplied_with_equality_constraints(
    augmented_ata: &DMatrix<f64>,
    augmented_atb: &DVector<f64>,
    epsilon: f64,
    constraint_count: usize,
) -> Result<DVector<f64>, NnlsError> {
    let n = augmented_ata.nrows();
    if augmented_ata.ncols() != n {
        return Err(NnlsError::NotSquare {
            rows: n,
            cols: augmented_ata.ncols(),
        });
    }
    if augmented_atb.len() != n {
        return Err(NnlsError::DimensionMismatch {
            expected: n,
            actual: augmented_atb.len(),
        });
    }
    if epsilon.is_nan() || epsilon <= 0.0 {
        return Err(NnlsError::InvalidTolerance(epsilon));
    }
    if constraint_count > n {
        return Err(NnlsError::TooManyConstraints {
            constraints: constraint_count,
            size: n,
        });
    }
    if augmented_ata.iter().chain(augmented_atb.iter()).any(|v| !v.is_finite()) {
        return Err(NnlsError::NonFinite);
    }

    let var_count = n - constraint_count;
    let mut x = DVector::zeros(n);
    if var_count == 0 {
        return Ok(x);
    }

    let mut solver = ActiveSet {
        ata: augmented_ata,
        atb: augmented_atb,
        constraint_count,
        passive: vec![false; var_count],
        mapping: Vec::with_capacity(n),
    };
    let mut w = augmented_atb.clone();
    let mut s = DVector::zeros(n);
    let mut size_p = 0;

    loop {
        // Most promising variable still fixed at zero.
        let Some((k, mut max_w)) = (0..var_count)
            .filter(|&i| !solver.passive[i])
            .map(|i| (i, w[i]))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            break;
        };

        // Iterate until effectively no values of w are positive. Equality
        // constraints need at least one free variable to be satisfiable.
        if !(max_w > epsilon || (size_p == 0 && constraint_count > 0)) {
            break;
        }

        solver.passive[k] = true;
        size_p = solver.refine(k, &mut x, &mut s, &mut max_w)?;

        x.copy_from(&s);
        w = augmented_atb - augmented_ata * &x;

        if !(size_p < var_count && max_w > epsilon) {
            break;
        }
    }

    Ok(x)
}

/// Working state of the active set iterations.
struct ActiveSet<'a> {
    ata: &'a DMatrix<f64>,
    atb: &'a DVector<f64>,
    constraint_count: usize,
    /// Variables currently free to move (all others are fixed at zero).
    passive: Vec<bool>,
    /// Maps rows of the restricted system to rows of the full system.
    mapping: Vec<usize>,
}

impl<'a> ActiveSet<'a> {
    /// Solves the system restricted to the free variables and the
    /// constraints, scattering the result into `s_out`.
    fn solve_partial(&mut self, s_out: &mut DVector<f64>) -> Result<DVector<f64>, NnlsError> {
        let n = self.ata.nrows();
        self.mapping.clear();
        self.mapping.extend(
            self.passive
                .iter()
                .enumerate()
                .filter_map(|(i, free)| free.then_some(i)),
        );
        self.mapping.extend(n - self.constraint_count..n);
        s_out.fill(0.0);

        let size = self.mapping.len();
        if size == 0 {
            return Ok(DVector::zeros(0));
        }

        let mapping = &self.mapping;
        let ata_p = DMatrix::from_fn(size, size, |i, j| self.ata[(mapping[i], mapping[j])]);
        let atb_p = DVector::from_fn(size, |i, _| self.atb[mapping[i]]);
        let s_p = ata_p
            .lu()
            .solve(&atb_p)
            .ok_or(NnlsError::Singular { free: size })?;
        if s_p.iter().any(|v| !v.is_finite()) {
            return Err(NnlsError::NonFinite);
        }

        for (i, &row) in mapping.iter().enumerate() {
            s_out[row] = s_p[i];
        }
        Ok(s_p)
    }

    /// Solves for the current free set and moves variables back to the
    /// fixed set until the free variables are all non-negative.
    ///
    /// Returns the final number of free variables.
    fn refine(
        &mut self,
        k: usize,
        x: &mut DVector<f64>,
        s: &mut DVector<f64>,
        max_w: &mut f64,
    ) -> Result<usize, NnlsError> {
        let mut s_p = self.solve_partial(s)?;
        let mut size_p = self.mapping.len() - self.constraint_count;

        while s_p.rows(0, size_p).iter().any(|v| *v < 0.0) {
            let mut alpha = 1.0;
            let mut blocking = None;
            for i in 0..size_p {
                let s_val = s_p[i];
                if s_val <= 0.0 {
                    let x_val = x[self.mapping[i]];
                    let candidate = x_val / (x_val - s_val);
                    if candidate <= alpha {
                        alpha = candidate;
                        blocking = Some(self.mapping[i]);
                    }
                }
            }
            let Some(j) = blocking else {
                return Err(NnlsError::NonFinite);
            };

            // x = x + alpha * (s - x)
            let step = &*s - &*x;
            x.axpy(alpha, &step, 1.0);

            // At least one previously positive value must go to zero, even
            // under round-off.
            self.passive[j] = false;
            x[j] = 0.0;

            if j == k {
                // Remaining gradients are treated as insignificant.
                *max_w = 0.0;
            } else {
                for i in 0..self.passive.len() {
                    if self.passive[i] && x[i] <= 0.0 {
                        self.passive[i] = false;
                        x[i] = 0.0;
                    }
                }
            }

            s_p = self.solve_partial(s)?;
            size_p = self.mapping.len() - self.constraint_count;
        }

        Ok(size_p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_nnls_reference_problem() {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(10, 5, &[
            0.8147, 0.1576, 0.6557, 0.7060, 0.4387,
            0.9058, 0.9706, 0.0357, 0.0318, 0.3816,
            0.1270, 0.9572, 0.8491, 0.2769, 0.7655,
            0.9134, 0.4854, 0.9340, 0.0462, 0.7952,
            0.6324, 0.8003, 0.6787, 0.0971, 0.1869,
            0.0975, 0.1419, 0.7577, 0.8235, 0.4898,
            0.2785, 0.4218, 0.7431, 0.6948, 0.4456,
            0.5469, 0.9157, 0.3922, 0.3171, 0.6463,
            0.9575, 0.7922, 0.6555, 0.9502, 0.7094,
            0.9649, 0.9595, 0.1712, 0.0344, 0.7547,
        ]);
        let b = DVector::from_row_slice(&[
            0.2760, 0.6797, 0.6551, 0.1626, 0.1190, 0.4984, 0.9597, 0.3404, 0.5853, 0.2238,
        ]);
        let x = solve(&a, &b, 1e-3).unwrap();
        let expected = [0.0, 0.3594, 0.0, 0.5265, 0.0];
        for (v, e) in x.iter().zip(expected) {
            assert_abs_diff_eq!(*v, e, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_nnls_sum_to_one_constraint() {
        #[rustfmt::skip]
        let ata = DMatrix::from_row_slice(3, 3, &[
            2.0, 0.5, 1.0,
            0.5, 1.0, 1.0,
            1.0, 1.0, 0.0,
        ]);
        let atb = DVector::from_row_slice(&[1.0, 0.2, 1.0]);
        let x = solve_premultiplied_with_equality_constraints(&ata, &atb, 1e-9, 1).unwrap();
        assert_abs_diff_eq!(x[0], 0.65, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(x[0] + x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nnls_zero_rhs() {
        let ata = DMatrix::<f64>::identity(3, 3);
        let atb = DVector::zeros(3);
        let x = solve_premultiplied(&ata, &atb, 1e-12).unwrap();
        assert!(x.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_nnls_unconstrained_positive_solution() {
        // Positive least squares solution is returned untouched.
        let ata = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let atb = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_premultiplied(&ata, &atb, 1e-12).unwrap();
        assert_abs_diff_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_nnls_invalid_arguments() {
        let ata = DMatrix::<f64>::identity(2, 2);
        assert_eq!(
            solve_premultiplied(&ata, &DVector::zeros(2), 0.0),
            Err(NnlsError::InvalidTolerance(0.0))
        );
        assert_eq!(
            solve_premultiplied(&ata, &DVector::zeros(3), 1e-6),
            Err(NnlsError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert!(matches!(
            solve_premultiplied(&DMatrix::zeros(2, 3), &DVector::zeros(2), 1e-6),
            Err(NnlsError::NotSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_nnls_singular_system() {
        // The only free variable has a zero diagonal.
        let ata = DMatrix::<f64>::zeros(1, 1);
        let atb = DVector::from_row_slice(&[1.0]);
        assert_eq!(
            solve_premultiplied(&ata, &atb, 1e-9),
            Err(NnlsError::Singular { free: 1 })
        );
    }

    #[test]
    fn test_nnls_singular_constrained_system() {
        // x0 + x1 = 1 with a zero Gram matrix: the free set {x1, λ} is
        // singular.
        #[rustfmt::skip]
        let ata = DMatrix::from_row_slice(3, 3, &[
            0.0, 0.0, 1.0,
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
        ]);
        let atb = DVector::from_row_slice(&[0.0, 0.0, 1.0]);
        assert!(matches!(
            solve_premultiplied_with_equality_constraints(&ata, &atb, 1e-9, 1),
            Err(NnlsError::Singular { .. })
        ));
    }

    #[test]
    fn test_nnls_non_finite_input() {
        let ata = DMatrix::<f64>::identity(2, 2);
        let atb = DVector::from_row_slice(&[1.0, f64::NAN]);
        assert_eq!(solve_premultiplied(&ata, &atb, 1e-9), Err(NnlsError::NonFinite));
    }

    proptest! {
        #[test]
        fn test_nnls_feasible_and_not_worse_than_zero(
            values in prop::collection::vec(-1.0f64..1.0, 24),
            rhs in prop::collection::vec(-1.0f64..1.0, 6),
        ) {
            let a = DMatrix::from_row_slice(6, 4, &values);
            let b = DVector::from_row_slice(&rhs);
            prop_assume!(a.tr_mul(&a).determinant().abs() > 1e-6);
            let x = solve(&a, &b, 1e-12).unwrap();
            prop_assert!(x.iter().all(|v| *v >= 0.0));
            let residual = (&a * &x - &b).norm_squared();
            prop_assert!(residual <= b.norm_squared() + 1e-9);
        }

        #[test]
        fn test_nnls_weights_sum_to_one(
            values in prop::collection::vec(0.0f64..1.0, 30),
            rhs in prop::collection::vec(0.0f64..1.0, 10),
        ) {
            let a = DMatrix::from_row_slice(10, 3, &values);
            let b = DVector::from_row_slice(&rhs);
            let ata = a.tr_mul(&a);
            prop_assume!(ata.determinant().abs() > 1e-6);
            let atb = a.tr_mul(&b);
            let mut aug_ata = DMatrix::zeros(4, 4);
            aug_ata.view_mut((0, 0), (3, 3)).copy_from(&ata);
            let mut aug_atb = DVector::zeros(4);
            aug_atb.rows_mut(0, 3).copy_from(&atb);
            for i in 0..3 {
                aug_ata[(3, i)] = 1.0;
                aug_ata[(i, 3)] = 1.0;
            }
            aug_atb[3] = 1.0;
            let x = solve_premultiplied_with_equality_constraints(&aug_ata, &aug_atb, 1e-12, 1)
                .unwrap();
            prop_assert!(x.rows(0, 3).iter().all(|v| *v >= 0.0));
            prop_assert!((x.rows(0, 3).sum() - 1.0).abs() < 1e-6);
        }
    }
}
