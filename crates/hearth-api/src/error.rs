// SPDX-License-Identifier: BUSL-1.1
//! # API Error Types
//!
//! [`AppError`] implements `IntoResponse` and carries every failure a
//! handler can return. Dispute-core errors convert via `From`, so handlers
//! use `?` directly on service calls.
//!
//! Client-facing 4xx errors all share one body shape:
//! `{"error": {"code": "...", "message": "..."}}`. Validation failures and
//! state conflicts are both 400; the `code` field tells them apart.
//! Internal messages are logged and replaced before reaching the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hearth_disputes::DisputeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code, e.g. `VALIDATION_ERROR`.
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// 404.
    #[error("{0}")]
    NotFound(String),

    /// Business-rule violation (400).
    #[error("{0}")]
    Validation(String),

    /// Body could not be parsed (400).
    #[error("{0}")]
    BadRequest(String),

    /// Dispute already resolved or being resolved (400).
    #[error("{0}")]
    StateConflict(String),

    /// 401.
    #[error("{0}")]
    Unauthorized(String),

    /// 403.
    #[error("{0}")]
    Forbidden(String),

    /// 500. Message is logged but not returned to the client.
    #[error("internal error: {0}")]
    Internal(String),

    /// A dependency is not reachable (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::StateConflict(_) => (StatusCode::BAD_REQUEST, "STATE_CONFLICT"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<DisputeError> for AppError {
    fn from(err: DisputeError) -> Self {
        match err {
            DisputeError::Validation(msg) => Self::Validation(msg),
            DisputeError::Forbidden(msg) => Self::Forbidden(msg),
            e @ DisputeError::NotFound { .. } => Self::NotFound(e.to_string()),
            DisputeError::StateConflict(msg) => Self::StateConflict(msg),
            e @ DisputeError::Persistence(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<hearth_core::ValidationError> for AppError {
    fn from(err: hearth_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_disputes::StoreError;
    use http_body_util::BodyExt;

    #[test]
    fn validation_and_conflict_are_both_400() {
        let (status, code) = AppError::Validation("x".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");

        let (status, code) = AppError::StateConflict("x".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "STATE_CONFLICT");
    }

    #[test]
    fn dispute_errors_map_to_status() {
        let cases = [
            (DisputeError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (DisputeError::Forbidden("f".into()), StatusCode::FORBIDDEN),
            (DisputeError::not_found("job", "j1"), StatusCode::NOT_FOUND),
            (DisputeError::StateConflict("c".into()), StatusCode::BAD_REQUEST),
            (
                DisputeError::Persistence(StoreError::Backend("db down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, _) = AppError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let err = AppError::from(DisputeError::Persistence(StoreError::Backend(
            "password authentication failed for user hearth".into(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn not_found_keeps_message() {
        let response = AppError::from(DisputeError::not_found("dispute", "d-1")).into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "dispute d-1 not found");
    }
}
