//! Configuration for combinations.

use serde::{Deserialize, Serialize};

/// Configuration options for [`Combiner`](crate::Combiner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Largest tolerated |C[i,j] - C[j,i]| in a correlation matrix (default: 1e-9).
    pub symmetry_tolerance: f64,

    /// Largest tolerated |C[i,i] - 1| in a correlation matrix (default: 1e-9).
    pub diagonal_tolerance: f64,

    /// How per-observable uncertainties are computed in multi-observable BLUE
    /// (default: [`UncertaintyForm::ExplicitSum`]).
    pub uncertainty_form: UncertaintyForm,
}

/// Evaluation of the per-observable variance `(W M Wᵀ)[o,o]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncertaintyForm {
    /// Explicit double sum `Σ_i Σ_j W[o,i] M[i,j] W[o,j]` per observable.
    ///
    /// Only the diagonal is ever computed; reproduces earlier results bit for bit.
    ExplicitSum,

    /// Diagonal of the full product `W M Wᵀ`.
    DiagonalProduct,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symmetry_tolerance: 1e-9,
            diagonal_tolerance: 1e-9,
            uncertainty_form: UncertaintyForm::ExplicitSum,
        }
    }
}

impl Default for UncertaintyForm {
    fn default() -> Self {
        Self::ExplicitSum
    }
}
