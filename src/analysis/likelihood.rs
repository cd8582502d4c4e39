//! Gaussian likelihood of the measurements at a parameter point.
//!
//! This is the quantity an external sampler evaluates once per sample, with
//! the covariance rebuilt for the sampled nuisance correlations:
//!
//! ```text
//! log L = -½ (n ln 2π + ln det M + rᵀ M⁻¹ r),   r = y − prediction(θ)
//! ```

use crate::constants::LOG_2PI;
use crate::error::{Error, Result};
use crate::statistics::linalg::positive_definite_cholesky;
use crate::types::{Matrix, Vector};

use super::blue::check_dimensions;

/// Log-density of `values` under `N(predictions, covariance)`.
///
/// # Errors
///
/// Returns [`Error::SingularMatrix`] if `covariance` is not positive definite,
/// and a configuration error for inconsistent dimensions.
pub fn gaussian_log_likelihood(
    values: &Vector,
    predictions: &Vector,
    covariance: &Matrix,
) -> Result<f64> {
    check_dimensions(values, covariance)?;
    check_dimensions(predictions, covariance)?;

    let chol = positive_definite_cholesky(covariance).ok_or(Error::SingularMatrix {
        context: "covariance",
    })?;

    // Solve L z = r
    let residual = values - predictions;
    let z = chol
        .l()
        .solve_lower_triangular(&residual)
        .ok_or(Error::SingularMatrix {
            context: "covariance",
        })?;
    let mahal_sq = z.dot(&z);
    let log_det = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();

    Ok(-0.5 * (values.len() as f64 * LOG_2PI + log_det + mahal_sq))
}
