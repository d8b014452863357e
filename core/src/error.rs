//! Error types for the localization estimator
//!
//! The estimator distinguishes between two failure modes. `InvalidArgument` is a caller
//! programming error (a non-positive particle count, a non-positive noise standard deviation,
//! malformed geometry) and should abort the run. `DegenerateState` arises at runtime when the
//! weight vector no longer describes a usable distribution, typically through underflow of the
//! Gaussian likelihood. The recommended recovery for the latter is to reset the weights to
//! uniform and continue, which is what [`crate::filter::MonteCarloLocalizer`] does.

use thiserror::Error;

/// Localization error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalizationError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Degenerate state: {0}")]
    DegenerateState(String),
}

impl LocalizationError {
    /// Whether the drive loop may reset the weights and continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LocalizationError::DegenerateState(_))
    }
}

pub type Result<T> = std::result::Result<T, LocalizationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_degenerate_state_is_recoverable() {
        assert!(LocalizationError::DegenerateState("all zero".into()).is_recoverable());
        assert!(!LocalizationError::InvalidArgument("n = 0".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = LocalizationError::InvalidArgument("particle count must be positive".into());
        assert_eq!(
            err.to_string(),
            "Invalid argument: particle count must be positive"
        );
    }
}
