//! Numeric constants shared by the estimators.

/// ln(2π), used by the Gaussian log-likelihood.
pub const LOG_2PI: f64 = 1.837_877_066_409_345_3;

/// Largest allowed absolute deviation of a correlation coefficient from [-1, 1].
pub(crate) const CORRELATION_BOUND_SLACK: f64 = 1e-12;

/// Smallest ratio of smallest to largest singular value for which a matrix
/// is treated as invertible.
pub(crate) const SINGULAR_RCOND: f64 = 1e-12;

/// Iteration cap of the singular value decomposition used for the rank check.
pub(crate) const SVD_MAX_ITERATIONS: usize = 1000;
