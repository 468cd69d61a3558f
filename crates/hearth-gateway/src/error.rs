// SPDX-License-Identifier: BUSL-1.1
//! Collaborator client error types.

use thiserror::Error;

/// Errors from payment processor calls.
///
/// The resolution workflow records these against the settlement operation
/// and carries on; they never reach an end user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor did not answer within the request timeout.
    #[error("payment processor timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Transport failure or 5xx response.
    #[error("payment processor unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    /// The processor refused the operation (4xx), e.g. an unknown
    /// destination account or a refund larger than the charge.
    #[error("payment processor rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    /// A 2xx response whose body could not be interpreted.
    #[error("payment processor returned an invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// The adapter cannot be constructed from the given configuration.
    #[error("payment processor not configured: {reason}")]
    NotConfigured { reason: String },
}

impl ProcessorError {
    /// True when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ServiceUnavailable { .. })
    }
}

/// Errors from notification delivery. Always logged, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification relay unavailable: {0}")]
    Unavailable(String),

    #[error("notification relay rejected notice with HTTP {status}")]
    Rejected { status: u16 },

    #[error("notifier not configured: {0}")]
    NotConfigured(String),
}
