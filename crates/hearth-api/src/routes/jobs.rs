// SPDX-License-Identifier: BUSL-1.1
//! # Job Routes
//!
//! Read-only view of a job, its payment hold and its active dispute, so a
//! party can see whether their job is frozen and where the money sits.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use hearth_core::JobId;
use hearth_disputes::{Job, PaymentHold};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::routes::{parse_id, read};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHoldResponse {
    pub id: String,
    pub status: String,
    pub total_amount: String,
    pub platform_fee: String,
    pub contractor_payout: String,
    pub currency: String,
    /// Status before a dispute froze the hold.
    pub pre_dispute_status: Option<String>,
    pub released_at: Option<String>,
}

impl From<&PaymentHold> for PaymentHoldResponse {
    fn from(h: &PaymentHold) -> Self {
        Self {
            id: h.id.to_string(),
            status: h.status.as_str().to_string(),
            total_amount: h.total_amount.to_string(),
            platform_fee: h.platform_fee.to_string(),
            contractor_payout: h.provider_payout.to_string(),
            currency: h.currency.clone(),
            pre_dispute_status: h.pre_dispute_status.map(|s| s.as_str().to_string()),
            released_at: h.released_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub title: String,
    pub status: String,
    pub homeowner_id: String,
    pub contractor_id: Option<String>,
    pub final_cost: Option<String>,
    pub payment_hold: Option<PaymentHoldResponse>,
    pub active_dispute_id: Option<String>,
    pub updated_at: String,
}

impl JobResponse {
    fn build(job: &Job, hold: Option<&PaymentHold>, active_dispute_id: Option<String>) -> Self {
        Self {
            id: job.id.to_string(),
            title: job.title.clone(),
            status: job.status.as_str().to_string(),
            homeowner_id: job.requester_id.to_string(),
            contractor_id: job.provider_id.map(|u| u.to_string()),
            final_cost: job.final_cost.map(|a| a.to_string()),
            payment_hold: hold.map(PaymentHoldResponse::from),
            active_dispute_id,
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/jobs/:id", get(get_job))
}

/// GET /v1/jobs/:id
#[utoipa::path(
    get,
    path = "/v1/jobs/{id}",
    params(("id" = String, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job with its payment hold", body = JobResponse),
        (status = 403, description = "Caller is not a party to the job", body = crate::error::ErrorBody),
        (status = 404, description = "Job not found", body = crate::error::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id: JobId = parse_id(&id, "job id")?;
    let job = read(&state, state.store.get_job(&job_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

    if !caller.is_admin() {
        let is_party = caller
            .user_id
            .is_some_and(|user| job.role_of(&user) == caller.role.party_role());
        if !is_party {
            return Err(AppError::Forbidden("only the job's parties may view this job".into()));
        }
    }

    let hold = read(&state, state.store.get_payment_hold(&job.id)).await?;
    let active = read(&state, state.store.find_active_dispute(&job.id)).await?;
    Ok(Json(JobResponse::build(
        &job,
        hold.as_ref(),
        active.map(|d| d.id.to_string()),
    )))
}
