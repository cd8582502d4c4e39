//! Error types for covariance assembly and BLUE combination.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a combination call.
///
/// All operations are deterministic, so none of these is worth retrying
/// without changing the input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The model or an input matrix is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Scalar BLUE was asked to combine measurements of different observables.
    #[error(
        "measurements of different observables cannot be combined with scalar BLUE: [{}]",
        .observables.join(", ")
    )]
    ObservableMismatch {
        /// Distinct observables in order of first appearance, each labelled
        /// `name (entry i)` with the active entry where it first appears.
        observables: Vec<String>,
    },

    /// A matrix that must be inverted is singular.
    #[error("{context} matrix is singular and cannot be inverted")]
    SingularMatrix {
        /// Which matrix failed to invert.
        context: &'static str,
    },
}

/// Inconsistent model definition or malformed input matrix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A correlation matrix does not match the number of model entries.
    #[error("correlation matrix of '{uncertainty}' is {found}x{found}, expected {expected}x{expected}")]
    DimensionMismatch {
        /// Uncertainty type owning the matrix.
        uncertainty: String,
        /// Number of entries in the model.
        expected: usize,
        /// Dimension of the supplied matrix.
        found: usize,
    },

    /// A correlation matrix violates symmetry, unit diagonal or [-1, 1] bounds.
    #[error("correlation matrix of '{uncertainty}' is malformed: {reason}")]
    MalformedCorrelation {
        /// Uncertainty type owning the matrix.
        uncertainty: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A matrix expected to be square is not.
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare {
        /// Row count.
        rows: usize,
        /// Column count.
        cols: usize,
    },

    /// A covariance has a negative variance on its diagonal.
    #[error("negative variance {value} at index {index}")]
    NegativeVariance {
        /// Diagonal index.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// A covariance has a NaN or infinite variance on its diagonal.
    #[error("non-finite variance {value} at index {index}")]
    NonFiniteVariance {
        /// Diagonal index.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// Two vectors or matrices that must agree in length do not.
    #[error("length mismatch: {what} has {found} entries, expected {expected}")]
    LengthMismatch {
        /// What was being checked.
        what: String,
        /// Required length.
        expected: usize,
        /// Actual length.
        found: usize,
    },

    /// A name was registered twice.
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// Kind of object ("measurement", "uncertainty", ...).
        kind: &'static str,
        /// Repeated name.
        name: String,
    },

    /// A reference to a measurement, bin or uncertainty that does not exist.
    #[error("unknown {kind} '{name}'")]
    Unknown {
        /// Kind of object referenced.
        kind: &'static str,
        /// Name that failed to resolve.
        name: String,
    },

    /// A nuisance correlation value lies outside its allowed range.
    #[error("nuisance correlation {value} for '{uncertainty}' outside [{low}, {high}]")]
    NuisanceOutOfRange {
        /// Uncertainty type of the nuisance correlation.
        uncertainty: String,
        /// Supplied coefficient.
        value: f64,
        /// Lower bound of the prior range.
        low: f64,
        /// Upper bound of the prior range.
        high: f64,
    },

    /// A nuisance correlation pairs an entry with itself.
    #[error("nuisance correlation for '{uncertainty}' must relate two distinct entries, got {entry} twice")]
    DiagonalNuisance {
        /// Uncertainty type of the nuisance correlation.
        uncertainty: String,
        /// The repeated entry.
        entry: String,
    },

    /// No entries are active, so there is nothing to combine.
    #[error("no active measurement entries")]
    EmptyCombination,
}
