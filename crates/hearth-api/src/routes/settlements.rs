// SPDX-License-Identifier: BUSL-1.1
//! # Settlement Routes
//!
//! Operator view of the settlement outbox, and a manual trigger for the
//! reconciliation pass that otherwise runs on a timer.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use hearth_disputes::SettlementStatus;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_admin, CallerIdentity};
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::routes::disputes::SettlementResponse;
use crate::routes::{page_size, read};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSettlementsQuery {
    /// `intended`, `confirmed`, `failed` or `abandoned`.
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReconcileQuery {
    /// Maximum operations to retry in this pass.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub attempted: usize,
    pub confirmed: usize,
    pub still_failed: usize,
    pub abandoned: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/settlements", get(list_settlements))
        .route("/v1/settlements/reconcile", post(reconcile_settlements))
}

/// GET /v1/settlements
#[utoipa::path(
    get,
    path = "/v1/settlements",
    params(ListSettlementsQuery),
    responses(
        (status = 200, description = "Settlement operations, least recently updated first", body = Vec<SettlementResponse>),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
pub async fn list_settlements(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListSettlementsQuery>, QueryRejection>,
) -> Result<Json<Vec<SettlementResponse>>, AppError> {
    require_admin(&caller)?;
    let q = extract_query(query)?;
    let status = q
        .status
        .as_deref()
        .map(str::parse::<SettlementStatus>)
        .transpose()?;
    let ops = read(&state, state.store.list_settlements(status, page_size(q.limit))).await?;
    Ok(Json(ops.iter().map(SettlementResponse::from).collect()))
}

/// POST /v1/settlements/reconcile
#[utoipa::path(
    post,
    path = "/v1/settlements/reconcile",
    params(ReconcileQuery),
    responses(
        (status = 200, description = "Reconciliation pass result", body = ReconcileResponse),
        (status = 400, description = "Another reconciliation pass is running", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
pub async fn reconcile_settlements(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ReconcileQuery>, QueryRejection>,
) -> Result<Json<ReconcileResponse>, AppError> {
    require_admin(&caller)?;
    let q = extract_query(query)?;
    let report = state.reconciler.retry_failed(page_size(q.limit)).await?;
    tracing::info!(
        attempted = report.attempted,
        confirmed = report.confirmed,
        abandoned = report.abandoned,
        "manual settlement reconciliation"
    );
    Ok(Json(ReconcileResponse {
        attempted: report.attempted,
        confirmed: report.confirmed,
        still_failed: report.still_failed,
        abandoned: report.abandoned,
    }))
}
