//! Estimators operating on a total covariance.
//!
//! 1. **Scalar BLUE** ([`blue`]): one observable, weights sum to one
//! 2. **Multi-observable BLUE** ([`multi`]): several observables via an indicator design matrix
//! 3. **Likelihood** ([`likelihood`]): Gaussian log-likelihood for external samplers

mod blue;
mod likelihood;
mod multi;

pub use blue::{combine, BlueResult, UncertaintyContribution};
pub use likelihood::gaussian_log_likelihood;
pub use multi::{combine_multi, combine_observables, design_matrix, MultiBlueResult};
