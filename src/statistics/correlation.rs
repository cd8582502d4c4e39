//! Conversion between covariance and (correlation, uncertainty) form.
//!
//! Externally supplied covariances are usually converted into an uncertainty
//! vector plus a correlation matrix, which is the form the covariance builder
//! expects for an [`UncertaintyType`](crate::UncertaintyType).

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::types::{Matrix, Vector};

use super::linalg::is_positive_definite;

/// A covariance split into correlations and standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationDecomposition {
    /// Correlation matrix, unit diagonal.
    pub correlation: Matrix,
    /// Standard deviations, `sqrt(cov[i,i])`.
    pub uncertainties: Vector,
    /// Whether the input covariance was positive definite.
    pub positive_definite: bool,
}

/// Convert a covariance matrix into correlations and uncertainties.
///
/// `unc[i] = sqrt(cov[i,i])` and `cor[i,j] = cov[i,j] / (unc[i] * unc[j])`.
///
/// A covariance that is not positive definite is only reported: a warning is
/// logged, `positive_definite` is false, and the conversion proceeds. An entry
/// with zero variance gets a zero correlation row with unit diagonal.
///
/// # Errors
///
/// Returns a configuration error if `cov` is not square or has a negative
/// or non-finite diagonal element.
pub fn convert_covariance(cov: &Matrix) -> Result<CorrelationDecomposition> {
    let n = cov.nrows();
    if cov.ncols() != n {
        return Err(ConfigurationError::NotSquare {
            rows: n,
            cols: cov.ncols(),
        }
        .into());
    }
    for (index, &value) in cov.diagonal().iter().enumerate() {
        if !value.is_finite() {
            return Err(ConfigurationError::NonFiniteVariance { index, value }.into());
        }
        if value < 0.0 {
            return Err(ConfigurationError::NegativeVariance { index, value }.into());
        }
    }

    let positive_definite = is_positive_definite(cov);
    if !positive_definite {
        warn!("covariance matrix ({}x{}) is not positive definite", n, n);
    }

    let uncertainties = cov.diagonal().map(f64::sqrt);
    if uncertainties.iter().any(|u| *u == 0.0) {
        warn!("covariance matrix has zero-variance entries; their correlations are set to 0");
    }

    let correlation = Matrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else {
            let scale = uncertainties[i] * uncertainties[j];
            if scale > 0.0 {
                cov[(i, j)] / scale
            } else {
                0.0
            }
        }
    });

    Ok(CorrelationDecomposition {
        correlation,
        uncertainties,
        positive_definite,
    })
}

/// Rebuild a covariance from correlations and uncertainties:
/// `cov[i,j] = unc[i] * unc[j] * cor[i,j]`.
///
/// # Errors
///
/// Returns a configuration error if `cor` is not square or its size differs
/// from the length of `unc`.
pub fn correlation_to_covariance(cor: &Matrix, unc: &Vector) -> Result<Matrix> {
    if !cor.is_square() {
        return Err(ConfigurationError::NotSquare {
            rows: cor.nrows(),
            cols: cor.ncols(),
        }
        .into());
    }
    if cor.nrows() != unc.len() {
        return Err(ConfigurationError::LengthMismatch {
            what: "uncertainty vector".to_string(),
            expected: cor.nrows(),
            found: unc.len(),
        }
        .into());
    }
    Ok(cor.component_mul(&(unc * unc.transpose())))
}
