//! # blue-combine
//!
//! Combine correlated measurements with the Best Linear Unbiased Estimator.
//!
//! This crate provides the numeric combination engine:
//! - Covariance ↔ (correlation, uncertainty) conversion with a positive-definiteness check
//! - Total covariance assembly from named uncertainty sources, activation flags
//!   and nuisance correlations
//! - Scalar BLUE for measurements of one observable
//! - Multi-observable BLUE via an indicator design matrix
//!
//! ## Quick Start
//!
//! ```ignore
//! use blue_combine::{blue, CombinationModel, Measurement, Observable, UncertaintyType};
//!
//! let mass = Observable::parameter("m_top", 0);
//! let mut model = CombinationModel::new();
//! model.add_measurement(
//!     Measurement::scalar("atlas", 172.7, mass.clone()).with_uncertainty("stat", 0.4),
//! )?;
//! model.add_measurement(
//!     Measurement::scalar("cms", 172.4, mass).with_uncertainty("stat", 0.3),
//! )?;
//! model.add_uncertainty(UncertaintyType::uncorrelated("stat"))?;
//!
//! let result = blue(&model)?;
//! println!("{} ± {}", result.value, result.unc);
//! ```
//!
//! ## Observables
//!
//! Measurements are "of the same observable" only when they share the same
//! [`Observable`] handle. Separately constructed observables never compare
//! equal, even with identical names.
//!
//! ## Nuisance correlations
//!
//! Correlation coefficients can be declared as [`NuisanceCorrelation`]s. An
//! external sampler supplies values per sample through [`NuisanceValues`];
//! the model is never mutated, so samples can be evaluated concurrently
//! (see [`Combiner::blue_samples`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod combiner;
mod config;
mod constants;
mod error;
mod model;
mod thread_pool;
mod types;

// Functional modules
pub mod analysis;
pub mod output;
pub mod statistics;

// Re-exports for public API
pub use analysis::{BlueResult, MultiBlueResult, UncertaintyContribution};
pub use combiner::Combiner;
pub use config::{Config, UncertaintyForm};
pub use constants::LOG_2PI;
pub use error::{ConfigurationError, Error, Result};
pub use model::{
    distinct_observables, ActiveEntry, CombinationModel, Correlation, Measurement,
    NuisanceCorrelation, NuisanceKey, NuisanceValues, Observable, UncertaintyType,
};
pub use statistics::{
    build_total_covariance, build_total_covariance_with, convert_covariance,
    correlation_to_covariance, CorrelationDecomposition,
};
pub use types::{EntryId, Matrix, Vector};

/// Combine the active measurements of a single observable with default configuration.
///
/// # Errors
///
/// - [`Error::ObservableMismatch`] if the active measurements reference more
///   than one observable
/// - [`Error::Configuration`] for an inconsistent model
/// - [`Error::SingularMatrix`] if the total covariance cannot be inverted
pub fn blue(model: &CombinationModel) -> Result<BlueResult> {
    Combiner::new().blue(model)
}

/// Combine the active measurements of any number of observables with default configuration.
///
/// # Errors
///
/// - [`Error::Configuration`] for an inconsistent model
/// - [`Error::SingularMatrix`] if the total covariance or the observable
///   precision matrix cannot be inverted
pub fn blue_multi(model: &CombinationModel) -> Result<MultiBlueResult> {
    Combiner::new().blue_multi(model)
}
