//! Error types for Marlin.

use thiserror::Error;

/// User-visible errors.
///
/// Everything except `Io` and `Serialization` describes a malformed problem,
/// which is rejected before search starts. Branch-local numerical trouble
/// inside the search never surfaces here.
#[derive(Debug, Error)]
pub enum MarlinError {
    /// A variable index is outside the query's variable range.
    #[error("variable x{var} is out of range (query has {num_vars} variables)")]
    VariableOutOfRange { var: usize, num_vars: usize },

    /// An equation carries NaN or an infinite coefficient or scalar.
    #[error("equation #{equation} has a non-finite value: {detail}")]
    NonFiniteValue { equation: usize, detail: String },

    /// A variable bound is NaN.
    #[error("invalid bound for variable x{var}: {reason}")]
    InvalidBound { var: usize, reason: String },

    /// A piecewise-linear constraint definition is inconsistent.
    #[error("invalid constraint #{index}: {reason}")]
    InvalidConstraint { index: usize, reason: String },

    /// A perturbation radius is negative or not finite.
    #[error("invalid perturbation radius {epsilon}: must be finite and non-negative")]
    InvalidRadius { epsilon: f64 },

    /// Two parallel inputs have different lengths.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// I/O error while reading or writing a query.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MarlinError {
    /// True for errors that reject a problem before search.
    pub fn is_malformed_problem(&self) -> bool {
        !matches!(self, MarlinError::Io(_) | MarlinError::Serialization(_))
    }
}

/// Result type for Marlin operations.
pub type Result<T> = std::result::Result<T, MarlinError>;
