//! Matrix inversion shared by the estimators.

use log::{debug, warn};
use nalgebra::{Cholesky, Dyn, SVD};

use crate::constants::{SINGULAR_RCOND, SVD_MAX_ITERATIONS};
use crate::error::{Error, Result};
use crate::types::Matrix;

/// Invert a square matrix.
///
/// A matrix whose reciprocal condition number (smallest over largest singular
/// value) is below `SINGULAR_RCOND` is rejected as singular, whatever the
/// rounding of the factorisation. Cholesky is then tried first since
/// covariances are normally positive definite; indefinite but regular
/// matrices fall back to LU. `context` names the matrix in the returned
/// [`Error::SingularMatrix`].
pub(crate) fn invert(matrix: &Matrix, context: &'static str) -> Result<Matrix> {
    let rcond = reciprocal_condition(matrix);
    if rcond.is_nan() || rcond < SINGULAR_RCOND {
        debug!("{} matrix has reciprocal condition number {:e}", context, rcond);
        return Err(Error::SingularMatrix { context });
    }

    if let Some(chol) = positive_definite_cholesky(matrix) {
        let inverse = chol.inverse();
        if inverse.iter().all(|x| x.is_finite()) {
            return Ok(symmetrize(&inverse));
        }
    }

    debug!("{} matrix is not positive definite, inverting via LU", context);
    match matrix.clone().try_inverse() {
        Some(inverse) if inverse.iter().all(|x| x.is_finite()) => {
            warn!(
                "{} matrix ({}x{}) is not positive definite; combination may be unphysical",
                context,
                matrix.nrows(),
                matrix.ncols()
            );
            Ok(inverse)
        }
        _ => Err(Error::SingularMatrix { context }),
    }
}

/// Ratio of the smallest to the largest singular value.
///
/// NaN for non-finite input, 0 for the zero matrix or when the decomposition
/// does not converge.
pub(crate) fn reciprocal_condition(matrix: &Matrix) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    if !matrix.iter().all(|x| x.is_finite()) {
        return f64::NAN;
    }
    match SVD::try_new(matrix.clone(), false, false, f64::EPSILON, SVD_MAX_ITERATIONS) {
        Some(svd) => {
            let largest = svd.singular_values.max();
            if largest > 0.0 {
                svd.singular_values.min() / largest
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

/// Cholesky factor of `matrix` if every pivot is strictly positive.
pub(crate) fn positive_definite_cholesky(matrix: &Matrix) -> Option<Cholesky<f64, Dyn>> {
    Cholesky::new(matrix.clone())
        .filter(|chol| chol.l_dirty().diagonal().iter().all(|d| *d > 0.0))
}

/// Whether `matrix` admits a Cholesky factorisation with a strictly positive diagonal.
pub(crate) fn is_positive_definite(matrix: &Matrix) -> bool {
    positive_definite_cholesky(matrix).is_some()
}

/// Symmetrise away rounding noise: `(A + Aᵀ) / 2`.
fn symmetrize(matrix: &Matrix) -> Matrix {
    (matrix + matrix.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_positive_definite() {
        let m = Matrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 9.0]);
        let inv = invert(&m, "covariance").unwrap();
        let product = &m * &inv;
        assert!((product - Matrix::identity(2, 2)).amax() < 1e-12);
    }

    #[test]
    fn test_invert_indefinite_uses_lu() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(!is_positive_definite(&m));
        let inv = invert(&m, "covariance").unwrap();
        let product = &m * &inv;
        assert!((product - Matrix::identity(2, 2)).amax() < 1e-12);
    }

    #[test]
    fn test_semidefinite_is_not_positive_definite() {
        let m = Matrix::from_element(2, 2, 1.0);
        assert!(!is_positive_definite(&m));
        assert!(is_positive_definite(&Matrix::identity(3, 3)));
    }

    #[test]
    fn test_rank_one_covariance_is_singular_regardless_of_rounding() {
        // One fully correlated source: M = σσᵀ has rank 1.
        for (a, b) in [(0.1, 0.3), (0.3, 0.7), (0.7, 1.3), (1.1, 2.9)] {
            let m = Matrix::from_row_slice(2, 2, &[a * a, a * b, a * b, b * b]);
            assert_eq!(
                invert(&m, "covariance").unwrap_err(),
                Error::SingularMatrix { context: "covariance" },
                "σ = ({}, {})",
                a,
                b
            );
        }
    }

    #[test]
    fn test_rank_deficient_three_by_three() {
        // Third row is the sum of the first two.
        let m = Matrix::from_row_slice(
            3,
            3,
            &[2.0, 0.5, 2.5, 0.5, 1.0, 1.5, 2.5, 1.5, 4.0],
        );
        assert!(invert(&m, "covariance").is_err());
        assert_eq!(reciprocal_condition(&Matrix::zeros(2, 2)), 0.0);
        assert!(reciprocal_condition(&Matrix::from_element(2, 2, f64::NAN)).is_nan());
    }

    #[test]
    fn test_well_conditioned_highly_correlated_is_invertible() {
        let rho = 0.999;
        let m = Matrix::from_row_slice(2, 2, &[1.0, rho, rho, 1.0]);
        assert!(reciprocal_condition(&m) > SINGULAR_RCOND);
        let inv = invert(&m, "covariance").unwrap();
        assert!((&m * inv - Matrix::identity(2, 2)).amax() < 1e-9);
    }

    #[test]
    fn test_invert_singular() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let err = invert(&m, "covariance").unwrap_err();
        assert_eq!(err, Error::SingularMatrix { context: "covariance" });
    }
}
