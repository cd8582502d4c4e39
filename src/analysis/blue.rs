//! Scalar BLUE: combine measurements of a single observable.
//!
//! With values `y`, total covariance `M` and `u = (1, …, 1)`:
//!
//! ```text
//! α     = M⁻¹u / (uᵀM⁻¹u)
//! value = α·y
//! unc²  = αᵀMα
//! ```
//!
//! The weights sum to one by construction, and `unc²` is the smallest variance
//! any unbiased linear combination of the inputs can reach.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Error, Result};
use crate::statistics::linalg::invert;
use crate::statistics::SourceCovariance;
use crate::types::{Matrix, Vector};

/// Result of a single-observable combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueResult {
    /// Labels of the active entries (`measurement[bin]`), parallel to `weights`.
    ///
    /// Empty when the combination was computed from bare matrices.
    #[serde(default)]
    pub entries: Vec<String>,
    /// Combined value.
    pub value: f64,
    /// Combined standard uncertainty.
    pub unc: f64,
    /// Weight of each active entry; sums to one.
    pub weights: Vector,
    /// χ² of the measurements with respect to the combined value.
    pub chi2: f64,
    /// Degrees of freedom of `chi2` (entries minus one).
    pub ndf: usize,
    /// Uncertainty contributed by each active source, in model order.
    ///
    /// Empty when the combination was computed from a bare covariance.
    pub breakdown: Vec<UncertaintyContribution>,
}

/// Share of the combined uncertainty coming from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyContribution {
    /// Uncertainty type name.
    pub name: String,
    /// `sqrt(αᵀ M_t α)` for this source's covariance `M_t`.
    pub unc: f64,
}

impl BlueResult {
    /// Attach entry labels.
    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }

    /// Attach the per-source uncertainty breakdown.
    ///
    /// Contributions add in quadrature to `unc` because `M = Σ_t M_t`.
    pub fn with_breakdown(mut self, sources: &[SourceCovariance]) -> Self {
        self.breakdown = sources
            .iter()
            .map(|source| UncertaintyContribution {
                name: source.name.clone(),
                unc: quadratic_form(&self.weights, &source.matrix).max(0.0).sqrt(),
            })
            .collect();
        self
    }
}

/// Combine `values` with covariance `covariance`.
///
/// # Errors
///
/// - configuration error if `covariance` is not square, does not match
///   `values`, or is empty
/// - [`Error::SingularMatrix`] if `covariance` cannot be inverted
pub fn combine(values: &Vector, covariance: &Matrix) -> Result<BlueResult> {
    check_dimensions(values, covariance)?;
    let n = values.len();

    let inverse = invert(covariance, "covariance")?;
    let ones = Vector::from_element(n, 1.0);
    let inverse_ones = &inverse * &ones;
    let precision = ones.dot(&inverse_ones);
    if !precision.is_finite() || precision == 0.0 {
        return Err(Error::SingularMatrix {
            context: "combined precision",
        });
    }

    let weights = inverse_ones / precision;
    let value = weights.dot(values);
    let variance = quadratic_form(&weights, covariance);
    if variance < 0.0 {
        warn!("combined variance {} is negative; covariance is not positive definite", variance);
    }

    let residual = values - &ones * value;
    let chi2 = quadratic_form(&residual, &inverse);

    Ok(BlueResult {
        entries: Vec::new(),
        value,
        unc: variance.sqrt(),
        weights,
        chi2,
        ndf: n - 1,
        breakdown: Vec::new(),
    })
}

/// `xᵀ A x`.
pub(crate) fn quadratic_form(x: &Vector, a: &Matrix) -> f64 {
    x.dot(&(a * x))
}

pub(crate) fn check_dimensions(values: &Vector, covariance: &Matrix) -> Result<()> {
    if !covariance.is_square() {
        return Err(ConfigurationError::NotSquare {
            rows: covariance.nrows(),
            cols: covariance.ncols(),
        }
        .into());
    }
    if covariance.nrows() != values.len() {
        return Err(ConfigurationError::LengthMismatch {
            what: "measurement values".to_string(),
            expected: covariance.nrows(),
            found: values.len(),
        }
        .into());
    }
    if values.is_empty() {
        return Err(ConfigurationError::EmptyCombination.into());
    }
    Ok(())
}
