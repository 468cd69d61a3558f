// SPDX-License-Identifier: BUSL-1.1
//! # Dispute Error Types
//!
//! [`DisputeError`] is what the filing service and the orchestrator return.
//! Every variant except `Persistence` is raised before any side effect.
//! Payment processor failures never appear here: they are recorded on the
//! settlement operation and the workflow continues.

use std::time::Duration;

use hearth_core::{DisputeId, JobId, ValidationError};
use thiserror::Error;

/// Errors raised by an [`crate::EscrowStore`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional insert lost to an existing active dispute.
    #[error("job {job_id} already has active dispute {existing}")]
    ActiveDisputeExists { job_id: JobId, existing: DisputeId },

    /// A conditional update found the job outside the expected status.
    #[error("job {job_id} is no longer {expected}")]
    JobStatusChanged { job_id: JobId, expected: &'static str },

    #[error("{entity} {id} not found in store")]
    Missing { entity: &'static str, id: String },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Error taxonomy of the dispute core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisputeError {
    /// Malformed input, wrong job state, or a duplicate active dispute.
    #[error("{0}")]
    Validation(String),

    /// The caller is not permitted to act on this job or dispute.
    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Already resolved, or claimed by a concurrent resolution.
    #[error("{0}")]
    StateConflict(String),

    /// The store failed. Progress stops here.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl DisputeError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<ValidationError> for DisputeError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = DisputeError::not_found("dispute", "abc");
        assert_eq!(err.to_string(), "dispute abc not found");

        let err = DisputeError::Validation("resolution text is required".into());
        assert_eq!(err.to_string(), "resolution text is required");

        let err: DisputeError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(
            err.to_string(),
            "persistence failure: store backend failure: connection reset"
        );
    }

    #[test]
    fn validation_error_converts() {
        let err: DisputeError = ValidationError::InvalidAmount {
            value: "-1".into(),
            reason: "amount must not be negative".into(),
        }
        .into();
        assert!(matches!(err, DisputeError::Validation(msg) if msg.contains("-1")));
    }
}
