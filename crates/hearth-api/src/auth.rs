// SPDX-License-Identifier: BUSL-1.1
//! # Authentication
//!
//! Bearer token middleware. Tokens bind a role and a user:
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   role ∈ homeowner | contractor | admin
//! Bearer {secret}                    admin without a bound user
//! ```
//!
//! The secret is compared in constant time against `AUTH_TOKEN`. Every
//! authenticated request carries a [`CallerIdentity`] in its extensions.
//! With no `AUTH_TOKEN` configured, every caller is an unbound admin.
//!
//! Whether a caller may act on a particular job is decided by the dispute
//! core's authorization gate, not here.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hearth_core::UserId;
use hearth_disputes::PartyRole;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Homeowner,
    Contractor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Homeowner => "homeowner",
            Self::Contractor => "contractor",
            Self::Admin => "admin",
        }
    }

    /// The job-party role this token role acts as, if any.
    pub fn party_role(&self) -> Option<PartyRole> {
        match self {
            Self::Homeowner => Some(PartyRole::Requester),
            Self::Contractor => Some(PartyRole::Provider),
            Self::Admin => None,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// `None` for the legacy admin token and when auth is disabled.
    pub user_id: Option<UserId>,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Resolve the user a request acts for. A bound caller may only act as
    /// themselves; an unbound admin may name anyone.
    pub fn acting_user(&self, claimed: Option<UserId>) -> Result<UserId, AppError> {
        match (self.user_id, claimed) {
            (Some(bound), Some(claimed)) if bound != claimed => Err(AppError::Forbidden(
                "token is bound to a different user".into(),
            )),
            (Some(bound), _) => Ok(bound),
            (None, Some(claimed)) => Ok(claimed),
            (None, None) => Err(AppError::Validation("user id is required".into())),
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

pub fn require_admin(caller: &CallerIdentity) -> Result<(), AppError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role 'admin' required, caller has '{}'",
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Shared secret, wiped from memory on drop.
#[derive(Clone)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Injected into request extensions by [`crate::app`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<SecretToken>,
}

// ── Token Validation ────────────────────────────────────────────────────────

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity {
                    role: Role::Admin,
                    user_id: None,
                })
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role = match *role {
                "homeowner" => Role::Homeowner,
                "contractor" => Role::Contractor,
                "admin" => Role::Admin,
                other => return Err(format!("unknown role: {other}")),
            };
            let user_id = if user.is_empty() {
                None
            } else {
                Some(
                    user.parse::<UserId>()
                        .map_err(|e| format!("invalid user id: {e}"))?,
                )
            };
            if user_id.is_none() && role != Role::Admin {
                return Err(format!("role '{}' requires a user id", role.as_str()));
            }
            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();

    match config.and_then(|c| c.token) {
        Some(expected) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
                Some(provided) => match parse_bearer_token(provided, expected.expose()) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                        unauthorized_response(&msg)
                    }
                },
                None if auth_header.is_some() => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        None => {
            request.extensions_mut().insert(CallerIdentity {
                role: Role::Admin,
                user_id: None,
            });
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
