// SPDX-License-Identifier: BUSL-1.1
//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented routes into one document served at
//! `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`{role}:{user_id}:{secret}` or `{secret}`. The secret is set via AUTH_TOKEN.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hearth Escrow Disputes API",
        version = "0.1.0",
        description = "Dispute filing and administrative resolution for marketplace escrow.\n\nFiling a dispute freezes the job and its payment hold. Resolving it releases the payout, refunds the homeowner, splits the funds or dismisses the dispute. Every processor call is recorded in a settlement outbox that is reconciled in the background.\n\nAuthentication: `Authorization: Bearer <token>`. Health checks and `/metrics` are unauthenticated.",
        license(name = "BUSL-1.1")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Disputes ─────────────────────────────────────────────────────
        crate::routes::disputes::file_dispute,
        crate::routes::disputes::resolve_dispute,
        crate::routes::disputes::review_dispute,
        crate::routes::disputes::get_dispute,
        crate::routes::disputes::list_disputes,
        crate::routes::disputes::dispute_stats,
        // ── Jobs ─────────────────────────────────────────────────────────
        crate::routes::jobs::get_job,
        // ── Settlements ──────────────────────────────────────────────────
        crate::routes::settlements::list_settlements,
        crate::routes::settlements::reconcile_settlements,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::disputes::FileDisputeRequest,
            crate::routes::disputes::ResolveDisputeRequest,
            crate::routes::disputes::ReviewDisputeRequest,
            crate::routes::disputes::FileDisputeResponse,
            crate::routes::disputes::ResolveDisputeResponse,
            crate::routes::disputes::DisputeResponse,
            crate::routes::disputes::ResolutionResponse,
            crate::routes::disputes::SettlementResponse,
            crate::routes::disputes::SkippedResponse,
            crate::routes::disputes::StatsResponse,
            crate::routes::jobs::JobResponse,
            crate::routes::jobs::PaymentHoldResponse,
            crate::routes::settlements::ReconcileResponse,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "disputes", description = "Dispute filing, review and resolution"),
        (name = "jobs", description = "Job and payment hold status"),
        (name = "settlements", description = "Settlement outbox and reconciliation"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
