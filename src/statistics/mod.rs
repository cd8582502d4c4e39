//! Covariance infrastructure for combinations.
//!
//! This module provides:
//! - Conversion between covariance and (correlation, uncertainty) form
//! - Assembly of the total covariance from named uncertainty sources
//! - Matrix inversion shared by the estimators

mod correlation;
mod covariance;

pub(crate) use covariance::sum_contributions;
pub(crate) mod linalg;

pub use correlation::{convert_covariance, correlation_to_covariance, CorrelationDecomposition};
pub use covariance::{
    build_total_covariance, build_total_covariance_with, covariance_contributions,
    total_covariance, SourceCovariance,
};
