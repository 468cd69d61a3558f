// SPDX-License-Identifier: BUSL-1.1
//! # Validation Errors
//!
//! Raised when a primitive is constructed from untrusted input.

use thiserror::Error;

/// A primitive value failed validation at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The amount string is not a non-negative decimal number.
    #[error("invalid amount {value:?}: {reason}")]
    InvalidAmount { value: String, reason: String },

    /// The amount does not fit in the minor-unit range.
    #[error("amount {value:?} exceeds the supported range")]
    AmountOverflow { value: String },

    /// An identifier string is not a valid UUID.
    #[error("invalid {kind} identifier {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_value() {
        let err = ValidationError::InvalidAmount {
            value: "12.x".into(),
            reason: "not a number".into(),
        };
        assert_eq!(err.to_string(), "invalid amount \"12.x\": not a number");

        let err = ValidationError::InvalidIdentifier {
            kind: "job",
            value: "abc".into(),
        };
        assert!(err.to_string().contains("job"));
    }
}
