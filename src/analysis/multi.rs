//! Multi-observable BLUE: combine measurements of several observables at once.
//!
//! The indicator design matrix `U` (entries × observables) has `U[i,j] = 1`
//! iff entry `i` measures the `j`-th distinct observable. Then:
//!
//! ```text
//! P      = Uᵀ M⁻¹ U
//! W      = P⁻¹ Uᵀ M⁻¹
//! values = W·y
//! unc_o² = Σ_i Σ_j W[o,i] M[i,j] W[o,j]
//! ```
//!
//! With a single observable this reduces to scalar BLUE.

use serde::{Deserialize, Serialize};

use crate::config::UncertaintyForm;
use crate::error::{ConfigurationError, Result};
use crate::model::{distinct_observables, Observable};
use crate::statistics::linalg::invert;
use crate::types::{Matrix, Vector};

use super::blue::{check_dimensions, quadratic_form};

/// Result of a multi-observable combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiBlueResult {
    /// Observable names, in order of first appearance.
    pub observables: Vec<String>,
    /// Labels of the active entries (`measurement[bin]`), parallel to the
    /// columns of `weights`. Empty when computed from bare matrices.
    #[serde(default)]
    pub entries: Vec<String>,
    /// Combined value per observable.
    pub values: Vector,
    /// Combined standard uncertainty per observable.
    pub uncs: Vector,
    /// Weight matrix `W` (observables × entries); each row sums to one.
    pub weights: Matrix,
    /// χ² of the measurements with respect to the combined values.
    pub chi2: f64,
    /// Degrees of freedom of `chi2` (entries minus observables).
    pub ndf: usize,
}

impl MultiBlueResult {
    /// Attach entry labels.
    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }
}

/// Indicator design matrix for `observables`, one row per entry.
///
/// Returns the matrix together with the distinct observables in column order.
pub fn design_matrix(observables: &[Observable]) -> (Matrix, Vec<Observable>) {
    let distinct = distinct_observables(observables);
    let design = Matrix::from_fn(observables.len(), distinct.len(), |i, j| {
        if observables[i].same_as(&distinct[j]) {
            1.0
        } else {
            0.0
        }
    });
    (design, distinct)
}

/// Combine `values` of several observables described by `design`.
///
/// `names` labels the columns of `design`.
///
/// # Errors
///
/// - configuration error for inconsistent dimensions
/// - [`Error::SingularMatrix`](crate::Error::SingularMatrix) if `covariance`
///   or the observable precision `P` cannot be inverted
pub fn combine_multi(
    values: &Vector,
    covariance: &Matrix,
    design: &Matrix,
    names: Vec<String>,
    form: UncertaintyForm,
) -> Result<MultiBlueResult> {
    check_dimensions(values, covariance)?;
    if design.nrows() != values.len() {
        return Err(ConfigurationError::LengthMismatch {
            what: "design matrix rows".to_string(),
            expected: values.len(),
            found: design.nrows(),
        }
        .into());
    }
    if names.len() != design.ncols() {
        return Err(ConfigurationError::LengthMismatch {
            what: "observable names".to_string(),
            expected: design.ncols(),
            found: names.len(),
        }
        .into());
    }

    let inverse = invert(covariance, "covariance")?;
    let ut_inverse = design.transpose() * &inverse;
    let precision = &ut_inverse * design;
    let weights = invert(&precision, "observable precision")? * ut_inverse;

    let combined = &weights * values;
    let uncs = match form {
        UncertaintyForm::ExplicitSum => explicit_sum_uncertainties(&weights, covariance),
        UncertaintyForm::DiagonalProduct => {
            (&weights * covariance * weights.transpose()).diagonal().map(f64::sqrt)
        }
    };

    let residual = values - design * &combined;
    let chi2 = quadratic_form(&residual, &inverse);

    Ok(MultiBlueResult {
        observables: names,
        entries: Vec::new(),
        values: combined,
        uncs,
        weights,
        chi2,
        ndf: values.len().saturating_sub(design.ncols()),
    })
}

/// `sqrt(Σ_i Σ_j W[o,i] M[i,j] W[o,j])` for every observable `o`.
fn explicit_sum_uncertainties(weights: &Matrix, covariance: &Matrix) -> Vector {
    let n = covariance.nrows();
    Vector::from_fn(weights.nrows(), |o, _| {
        let mut variance = 0.0;
        for i in 0..n {
            for j in 0..n {
                variance += weights[(o, i)] * covariance[(i, j)] * weights[(o, j)];
            }
        }
        variance.sqrt()
    })
}

/// Combine entries measuring the given observables.
pub fn combine_observables(
    values: &Vector,
    covariance: &Matrix,
    observables: &[Observable],
    form: UncertaintyForm,
) -> Result<MultiBlueResult> {
    let (design, distinct) = design_matrix(observables);
    let names = distinct.iter().map(|o| o.name().to_string()).collect();
    combine_multi(values, covariance, &design, names, form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::blue::combine;
    use crate::Error;

    fn two_observables() -> (Vector, Matrix, Vec<Observable>) {
        let a = Observable::parameter("a", 0);
        let b = Observable::parameter("b", 1);
        let values = Vector::from_vec(vec![10.0, 11.0, 20.0, 21.0]);
        let cov = Matrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.2, 0.1, 0.0, //
                0.2, 2.0, 0.0, 0.1, //
                0.1, 0.0, 1.5, 0.3, //
                0.0, 0.1, 0.3, 1.0,
            ],
        );
        (values, cov, vec![a.clone(), a, b.clone(), b])
    }

    #[test]
    fn test_design_matrix() {
        let a = Observable::parameter("a", 0);
        let b = Observable::parameter("b", 1);
        let (u, distinct) = design_matrix(&[b.clone(), a.clone(), b.clone()]);
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].name(), "b");
        assert_eq!(u, Matrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0]));
    }

    #[test]
    fn test_weight_rows_sum_to_one() {
        let (y, cov, obs) = two_observables();
        let r = combine_observables(&y, &cov, &obs, UncertaintyForm::ExplicitSum).unwrap();
        assert_eq!(r.observables, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(r.weights.shape(), (2, 4));
        let (design, _) = design_matrix(&obs);
        // W U = I: each observable's weights sum to one on its own entries
        // and cancel on the others.
        let wu = &r.weights * design;
        assert!((wu - Matrix::identity(2, 2)).amax() < 1e-12);
        assert_eq!(r.ndf, 2);
        assert!(r.values[0] > 9.0 && r.values[0] < 12.0);
        assert!(r.values[1] > 19.0 && r.values[1] < 22.0);
    }

    #[test]
    fn test_uncertainty_forms_agree() {
        let (y, cov, obs) = two_observables();
        let explicit = combine_observables(&y, &cov, &obs, UncertaintyForm::ExplicitSum).unwrap();
        let product = combine_observables(&y, &cov, &obs, UncertaintyForm::DiagonalProduct).unwrap();
        assert!((explicit.uncs - product.uncs).amax() < 1e-12);
        assert_eq!(explicit.values, product.values);
    }

    #[test]
    fn test_single_observable_matches_scalar() {
        let cov = Matrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 9.0, 2.0, 0.5, 2.0, 6.0]);
        let y = Vector::from_vec(vec![10.0, 12.0, 11.0]);
        let mass = Observable::parameter("mass", 0);
        let obs = vec![mass.clone(), mass.clone(), mass];

        let scalar = combine(&y, &cov).unwrap();
        let multi = combine_observables(&y, &cov, &obs, UncertaintyForm::ExplicitSum).unwrap();

        assert!((multi.values[0] - scalar.value).abs() < 1e-12);
        assert!((multi.uncs[0] - scalar.unc).abs() < 1e-12);
        for i in 0..3 {
            assert!((multi.weights[(0, i)] - scalar.weights[i]).abs() < 1e-12);
        }
        assert!((multi.chi2 - scalar.chi2).abs() < 1e-10);
        assert_eq!(multi.ndf, scalar.ndf);
    }

    #[test]
    fn test_uncorrelated_observables_combine_independently() {
        let a = Observable::parameter("a", 0);
        let b = Observable::parameter("b", 1);
        let cov = Matrix::from_diagonal(&Vector::from_vec(vec![1.0, 1.0, 4.0]));
        let y = Vector::from_vec(vec![1.0, 3.0, 7.0]);
        let r = combine_observables(&y, &cov, &[a.clone(), a, b], UncertaintyForm::ExplicitSum)
            .unwrap();
        assert!((r.values[0] - 2.0).abs() < 1e-12);
        assert!((r.values[1] - 7.0).abs() < 1e-12);
        assert!((r.uncs[0] - 0.5_f64.sqrt()).abs() < 1e-12);
        assert!((r.uncs[1] - 2.0).abs() < 1e-12);
        assert_eq!(r.weights[(1, 0)], 0.0);
    }

    #[test]
    fn test_singular_covariance() {
        let (y, _, obs) = two_observables();
        let cov = Matrix::from_element(4, 4, 1.0);
        assert!(matches!(
            combine_observables(&y, &cov, &obs, UncertaintyForm::ExplicitSum),
            Err(Error::SingularMatrix { context: "covariance" })
        ));
    }

    #[test]
    fn test_empty_design_column_is_singular() {
        let cov = Matrix::identity(2, 2);
        let y = Vector::from_vec(vec![1.0, 2.0]);
        let design = Matrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 0.0]);
        let err = combine_multi(
            &y,
            &cov,
            &design,
            vec!["a".into(), "b".into()],
            UncertaintyForm::ExplicitSum,
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::SingularMatrix {
                context: "observable precision"
            }
        );
    }
}
