// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Fatal errors raised by cod-panel stages.
///
/// Conditions that only degrade one row or one correlation pair are not
/// errors; they are reported as [`crate::Warning`] values instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodError {
    /// Key or schema failure that makes a dataset unusable.
    #[error("data integrity: {0}")]
    DataIntegrity(String),
    /// Invalid configuration or argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Non-finite or otherwise unusable numeric state.
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
}

impl CodError {
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn numerical_issue(message: impl Into<String>) -> Self {
        Self::NumericalIssue(message.into())
    }

    /// Returns true when the error should abort only the affected dataset.
    pub fn is_dataset_local(&self) -> bool {
        matches!(self, Self::DataIntegrity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::CodError;

    #[test]
    fn constructors_format_with_category_prefix() {
        assert_eq!(
            CodError::data_integrity("duplicate key").to_string(),
            "data integrity: duplicate key"
        );
        assert_eq!(
            CodError::invalid_input("k must be >= 1").to_string(),
            "invalid input: k must be >= 1"
        );
        assert_eq!(
            CodError::numerical_issue("nan").to_string(),
            "numerical issue: nan"
        );
    }

    #[test]
    fn only_integrity_errors_are_dataset_local() {
        assert!(CodError::data_integrity("x").is_dataset_local());
        assert!(!CodError::invalid_input("x").is_dataset_local());
        assert!(!CodError::numerical_issue("x").is_dataset_local());
    }
}
