// SPDX-License-Identifier: BUSL-1.1
//! # hearth-api — HTTP Service for Escrow Disputes
//!
//! Wraps the dispute core in an Axum router: parties file disputes,
//! administrators review and resolve them, operators inspect and reconcile
//! the settlement outbox.
//!
//! ## API Surface
//!
//! | Prefix               | Module                    |
//! |----------------------|---------------------------|
//! | `/v1/disputes*`      | [`routes::disputes`]      |
//! | `/v1/jobs/*`         | [`routes::jobs`]          |
//! | `/v1/settlements*`   | [`routes::settlements`]   |
//! | `/openapi.json`      | [`openapi`]               |
//! | `/health/*`, `/metrics` | unauthenticated        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the router. Health checks and `/metrics` sit outside the auth
/// middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics_on = state.config.metrics_enabled;

    let mut api = Router::new()
        .merge(routes::disputes::router())
        .merge(routes::jobs::router())
        .merge(routes::settlements::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(axum::Extension(state.metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));
    if metrics_on {
        unauthenticated = unauthenticated.route("/metrics", axum::routing::get(prometheus_metrics));
    }
    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics. Refreshes the per-status dispute gauge, then encodes.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match routes::read(&state, state.store.count_disputes()).await {
        Ok(counts) => state.metrics.set_dispute_counts(&counts),
        Err(e) => tracing::warn!(error = %e, "could not refresh dispute gauge"),
    }

    match state.metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

async fn liveness() -> &'static str {
    "ok"
}

/// 200 "ready" when the store answers a ping, 503 otherwise.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match routes::read(&state, state.store.ping()).await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unreachable").into_response()
        }
    }
}
