//! Type aliases and common types.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Dynamically sized matrix used for covariances, correlations and weights.
pub type Matrix = DMatrix<f64>;

/// Dynamically sized vector used for values, magnitudes and weights.
pub type Vector = DVector<f64>;

/// Identifies one scalar entry of the model: a measurement and one of its bins.
///
/// Scalar measurements have a single entry with `bin == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    /// Name of the measurement the entry belongs to.
    pub measurement: String,
    /// Bin index within the measurement.
    pub bin: usize,
}

impl EntryId {
    /// Entry `bin` of measurement `measurement`.
    pub fn new(measurement: impl Into<String>, bin: usize) -> Self {
        Self {
            measurement: measurement.into(),
            bin,
        }
    }

    /// The single entry of a scalar measurement.
    pub fn scalar(measurement: impl Into<String>) -> Self {
        Self::new(measurement, 0)
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.measurement, self.bin)
    }
}
