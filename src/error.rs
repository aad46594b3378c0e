//! Error types for robustez operations.
//!
//! Provides contextual errors for the attack and ensemble entry points.
//! Shape violations inside tensor kernels are programming errors and are
//! asserted there instead.

use std::fmt;

/// Main error type for robustez operations.
///
/// # Examples
///
/// ```
/// use robustez::error::RobustezError;
///
/// let err = RobustezError::DimensionMismatch {
///     expected: "4-D image batch (N, C, H, W)".to_string(),
///     actual: "2-D".to_string(),
/// };
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug)]
pub enum RobustezError {
    /// Tensor dimensions don't match what the operation requires.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// An ensemble was constructed with no member classifiers.
    EmptyEnsemble,

    /// Backpropagation produced no gradient for the perturbation.
    ///
    /// Happens when the victim model's output does not depend on its
    /// input, so no differentiable path reaches the perturbation.
    GradientUnavailable {
        /// What was being differentiated
        what: String,
    },

    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },
}

impl fmt::Display for RobustezError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobustezError::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            RobustezError::EmptyEnsemble => {
                write!(f, "ensemble requires at least one member classifier")
            }
            RobustezError::GradientUnavailable { what } => {
                write!(
                    f,
                    "no gradient reached {what}; the victim model must depend on its input"
                )
            }
            RobustezError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "invalid hyperparameter {param}={value}: must satisfy {constraint}"
                )
            }
        }
    }
}

impl std::error::Error for RobustezError {}

/// Convenience result type for robustez operations.
pub type Result<T> = std::result::Result<T, RobustezError>;
