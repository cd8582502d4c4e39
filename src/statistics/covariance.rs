//! Total covariance assembly.
//!
//! For every active uncertainty type `t` with per-entry magnitudes `σ_t` and
//! correlation matrix `C_t`, the contribution is `(σ_t σ_tᵀ) ⊙ C_t`. The total
//! covariance is the sum over active types:
//!
//! ```text
//! M = Σ_t (σ_t ⊗ σ_t) ⊙ C_t
//! ```
//!
//! Only active entries appear in `M`; deactivating a bin shrinks the matrix.
//! Nuisance correlations replace `C_t[a,b]` and `C_t[b,a]` before the
//! product. The model is never mutated, so assembly can run concurrently for
//! different nuisance values.

use std::collections::HashMap;

use log::debug;

use crate::config::Config;
use crate::constants::CORRELATION_BOUND_SLACK;
use crate::error::{ConfigurationError, Result};
use crate::model::{ActiveEntry, CombinationModel, Correlation, NuisanceValues, UncertaintyType};
use crate::types::{EntryId, Matrix, Vector};

/// Covariance contribution of a single uncertainty type.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCovariance {
    /// Uncertainty type name.
    pub name: String,
    /// Contribution restricted to the active entries.
    pub matrix: Matrix,
}

/// Total covariance of the active entries using the model's current nuisance values.
pub fn build_total_covariance(model: &CombinationModel) -> Result<Matrix> {
    total_covariance(model, &NuisanceValues::new(), &Config::default())
}

/// Total covariance with explicit nuisance overrides.
///
/// Overrides take precedence over the model's current values; every key must
/// name a nuisance correlation registered on the model.
pub fn build_total_covariance_with(
    model: &CombinationModel,
    overrides: &NuisanceValues,
) -> Result<Matrix> {
    total_covariance(model, overrides, &Config::default())
}

/// Total covariance with explicit overrides and validation tolerances.
pub fn total_covariance(
    model: &CombinationModel,
    overrides: &NuisanceValues,
    config: &Config,
) -> Result<Matrix> {
    let contributions = covariance_contributions(model, overrides, config)?;
    Ok(sum_contributions(model.active_entries().len(), &contributions))
}

/// Sum of per-type contributions; the zero matrix when no source is active.
pub(crate) fn sum_contributions(n: usize, contributions: &[SourceCovariance]) -> Matrix {
    contributions
        .iter()
        .fold(Matrix::zeros(n, n), |acc, c| acc + &c.matrix)
}

/// Per-type covariance contributions of the active uncertainty types.
///
/// # Errors
///
/// - [`ConfigurationError::EmptyCombination`] if no entry is active
/// - [`ConfigurationError::DimensionMismatch`] if a correlation matrix does not
///   cover every model entry
/// - [`ConfigurationError::MalformedCorrelation`] for asymmetric matrices,
///   non-unit diagonals or coefficients outside [-1, 1]
/// - nuisance errors for unknown keys or out-of-range values
pub fn covariance_contributions(
    model: &CombinationModel,
    overrides: &NuisanceValues,
    config: &Config,
) -> Result<Vec<SourceCovariance>> {
    let entries = model.active_entries();
    if entries.is_empty() {
        return Err(ConfigurationError::EmptyCombination.into());
    }
    let n_total = model.entry_count();
    let nuisances = resolve_nuisances(model, overrides)?;

    // Full entry index -> row in the active covariance.
    let position: HashMap<usize, usize> = entries
        .iter()
        .enumerate()
        .map(|(row, e)| (e.index, row))
        .collect();

    let active_types: Vec<&UncertaintyType> =
        model.uncertainties().iter().filter(|u| u.is_active()).collect();
    debug!(
        "assembling covariance: {} of {} entries active, {} of {} sources active",
        entries.len(),
        n_total,
        active_types.len(),
        model.uncertainties().len()
    );

    active_types
        .into_iter()
        .map(|source| -> Result<SourceCovariance> {
            let mut correlation = active_correlation(source, &entries, n_total, config)?;
            for (uncertainty, a, b, value) in &nuisances {
                if uncertainty != source.name() {
                    continue;
                }
                if let (Some(&p), Some(&q)) = (position.get(a), position.get(b)) {
                    correlation[(p, q)] = *value;
                    correlation[(q, p)] = *value;
                }
            }

            let sigma = Vector::from_iterator(
                entries.len(),
                entries.iter().map(|e| e.magnitude(source.name())),
            );
            let matrix = (&sigma * sigma.transpose()).component_mul(&correlation);
            Ok(SourceCovariance {
                name: source.name().to_string(),
                matrix,
            })
        })
        .collect()
}

/// Correlation of `source` restricted to the active entries.
fn active_correlation(
    source: &UncertaintyType,
    entries: &[ActiveEntry<'_>],
    n_total: usize,
    config: &Config,
) -> Result<Matrix> {
    let n = entries.len();
    match source.correlation() {
        Correlation::Identity => Ok(Matrix::identity(n, n)),
        Correlation::Matrix(full) => {
            validate_correlation(source.name(), full, n_total, config)?;
            Ok(Matrix::from_fn(n, n, |i, j| {
                full[(entries[i].index, entries[j].index)]
            }))
        }
    }
}

/// Check size, symmetry, unit diagonal and [-1, 1] bounds of a correlation matrix.
pub(crate) fn validate_correlation(
    name: &str,
    matrix: &Matrix,
    expected: usize,
    config: &Config,
) -> Result<()> {
    let malformed = |reason: String| ConfigurationError::MalformedCorrelation {
        uncertainty: name.to_string(),
        reason,
    };

    if !matrix.is_square() {
        return Err(malformed(format!(
            "not square ({}x{})",
            matrix.nrows(),
            matrix.ncols()
        ))
        .into());
    }
    if matrix.nrows() != expected {
        return Err(ConfigurationError::DimensionMismatch {
            uncertainty: name.to_string(),
            expected,
            found: matrix.nrows(),
        }
        .into());
    }

    for i in 0..expected {
        let diag = matrix[(i, i)];
        if !diag.is_finite() || (diag - 1.0).abs() > config.diagonal_tolerance {
            return Err(malformed(format!("diagonal element {} is {}, expected 1", i, diag)).into());
        }
        for j in (i + 1)..expected {
            let (upper, lower) = (matrix[(i, j)], matrix[(j, i)]);
            if !upper.is_finite() || !lower.is_finite() {
                return Err(malformed(format!(
                    "non-finite coefficient at ({}, {}): {} vs {}",
                    i, j, upper, lower
                ))
                .into());
            }
            if (upper - lower).abs() > config.symmetry_tolerance {
                return Err(malformed(format!(
                    "not symmetric at ({}, {}): {} vs {}",
                    i, j, upper, lower
                ))
                .into());
            }
            if upper.abs() > 1.0 + CORRELATION_BOUND_SLACK {
                return Err(malformed(format!(
                    "coefficient {} at ({}, {}) outside [-1, 1]",
                    upper, i, j
                ))
                .into());
            }
        }
    }
    Ok(())
}

/// Resolve every registered nuisance correlation to
/// `(uncertainty, full index a, full index b, value)`.
fn resolve_nuisances(
    model: &CombinationModel,
    overrides: &NuisanceValues,
) -> Result<Vec<(String, usize, usize, f64)>> {
    for (key, _) in overrides.iter() {
        if !model.nuisances().iter().any(|n| n.key() == key) {
            return Err(ConfigurationError::Unknown {
                kind: "nuisance correlation",
                name: key.to_string(),
            }
            .into());
        }
    }

    model
        .nuisances()
        .iter()
        .map(|nuisance| -> Result<(String, usize, usize, f64)> {
            let key = nuisance.key();
            let value = nuisance.check(overrides.get(key).unwrap_or(nuisance.value()))?;
            let index = |entry: &EntryId| {
                model.entry_index(entry).ok_or_else(|| ConfigurationError::Unknown {
                    kind: "entry",
                    name: key.to_string(),
                })
            };
            let a = index(&key.pair.0)?;
            let b = index(&key.pair.1)?;
            Ok((key.uncertainty.clone(), a, b, value))
        })
        .collect()
}
