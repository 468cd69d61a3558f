// SPDX-License-Identifier: BUSL-1.1
//! # Dispute Routes
//!
//! Parties file disputes against in-progress jobs; administrators review
//! and resolve them. Request and response bodies use camelCase field names,
//! and money is accepted either as a JSON number or a decimal string.
//!
//! | Method | Path                        | Caller        |
//! |--------|-----------------------------|---------------|
//! | POST   | `/v1/disputes`              | job party     |
//! | POST   | `/v1/disputes/resolve`      | admin         |
//! | POST   | `/v1/disputes/:id/review`   | admin         |
//! | GET    | `/v1/disputes/:id`          | admin or party|
//! | GET    | `/v1/disputes`              | admin         |
//! | GET    | `/v1/disputes/stats`        | admin         |

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use hearth_core::{Amount, DisputeId, JobId, UserId};
use hearth_disputes::{
    Dispute, DisputeCounts, DisputeFilter, DisputeReason, DisputeStatus, FileDispute, HoldStatus,
    PartyRole, ResolutionAction, ResolutionKind, ResolveDispute, SettlementOperation,
    SkippedOperation,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_admin, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::routes::{page_size, parse_id, read};
use crate::state::AppState;

// ── Request DTOs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileDisputeRequest {
    #[serde(default)]
    pub job_id: String,
    /// `work_not_completed`, `quality_issues`, ... or the display label.
    #[serde(default)]
    pub reason: String,
    pub description: Option<String>,
    /// Defaults to the user bound to the bearer token.
    pub user_id: Option<String>,
    /// `homeowner` or `contractor`.
    #[serde(default)]
    pub user_type: String,
}

impl Validate for FileDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.job_id.trim().is_empty() || self.reason.trim().is_empty() || self.user_type.trim().is_empty() {
            return Err("missing required fields: jobId, reason, userType".into());
        }
        Ok(())
    }
}

/// A money value as sent by clients: `200`, `199.99` or `"199.99"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    fn parse(&self, field: &str) -> Result<Amount, AppError> {
        let raw = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        };
        Amount::from_decimal_str(&raw).map_err(|e| AppError::Validation(format!("invalid {field}: {e}")))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDisputeRequest {
    #[serde(default)]
    pub dispute_id: String,
    /// `release_to_contractor`, `refund_homeowner`, `partial_refund` or `dismissed`.
    #[serde(default)]
    pub action: String,
    /// Explanation shown to both parties.
    #[serde(default)]
    pub resolution: String,
    #[schema(value_type = Option<f64>)]
    pub contractor_amount: Option<AmountInput>,
    #[schema(value_type = Option<f64>)]
    pub homeowner_refund: Option<AmountInput>,
    pub admin_notes: Option<String>,
    /// Defaults to the user bound to the bearer token.
    pub admin_id: Option<String>,
    /// Hold status to restore on dismissal when none was recorded at filing.
    pub confirm_hold_status: Option<String>,
}

impl Validate for ResolveDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.dispute_id.trim().is_empty() || self.action.trim().is_empty() || self.resolution.trim().is_empty() {
            return Err("missing required fields: disputeId, action, resolution".into());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDisputeRequest {
    pub admin_id: Option<String>,
}

impl Validate for ReviewDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListDisputesQuery {
    /// `open`, `under_review`, `resolving` or `resolved`.
    pub status: Option<String>,
    pub job_id: Option<String>,
    /// 1 to 500, default 100.
    pub limit: Option<usize>,
}

// ── Response DTOs ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    pub action: String,
    pub text: String,
    pub contractor_amount: Option<String>,
    pub homeowner_refund: Option<String>,
    pub resolved_by: String,
    pub resolved_at: String,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisputeResponse {
    pub id: String,
    pub job_id: String,
    pub filed_by_id: String,
    pub filed_by_type: String,
    pub reason: String,
    pub description: Option<String>,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub resolution: Option<ResolutionResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Dispute> for DisputeResponse {
    fn from(d: &Dispute) -> Self {
        Self {
            id: d.id.to_string(),
            job_id: d.job_id.to_string(),
            filed_by_id: d.filed_by.to_string(),
            filed_by_type: d.filer_role.as_str().to_string(),
            reason: d.reason.as_str().to_string(),
            description: d.description.clone(),
            status: d.status.as_str().to_string(),
            reviewed_by: d.reviewed_by.map(|u| u.to_string()),
            resolution: d.resolution.as_ref().map(|r| ResolutionResponse {
                action: r.action.as_str().to_string(),
                text: r.text.clone(),
                contractor_amount: r.contractor_amount.map(|a| a.to_string()),
                homeowner_refund: r.homeowner_refund.map(|a| a.to_string()),
                resolved_by: r.resolved_by.to_string(),
                resolved_at: r.resolved_at.to_rfc3339(),
                admin_notes: r.admin_notes.clone(),
            }),
            created_at: d.created_at.to_rfc3339(),
            updated_at: d.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub id: String,
    pub dispute_id: String,
    pub job_id: String,
    /// `transfer` or `refund`.
    pub kind: String,
    /// Major units, e.g. `"200.00"`. Absent on a full refund.
    pub amount: Option<String>,
    pub currency: String,
    pub resolution_tag: String,
    pub idempotency_key: String,
    /// `intended`, `confirmed`, `failed` or `abandoned`.
    pub status: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub receipt_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&SettlementOperation> for SettlementResponse {
    fn from(op: &SettlementOperation) -> Self {
        Self {
            id: op.id.to_string(),
            dispute_id: op.dispute_id.to_string(),
            job_id: op.job_id.to_string(),
            kind: op.kind.as_str().to_string(),
            amount: op.amount.map(|a| a.to_string()),
            currency: op.currency.clone(),
            resolution_tag: op.resolution_tag.clone(),
            idempotency_key: op.idempotency_key.clone(),
            status: op.status.as_str().to_string(),
            attempts: op.attempts,
            last_error: op.last_error.clone(),
            receipt_id: op.receipt_id.clone(),
            created_at: op.created_at.to_rfc3339(),
            updated_at: op.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SkippedResponse {
    pub kind: String,
    pub reason: String,
}

impl From<&SkippedOperation> for SkippedResponse {
    fn from(s: &SkippedOperation) -> Self {
        Self {
            kind: s.kind.as_str().to_string(),
            reason: s.reason.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileDisputeResponse {
    pub success: bool,
    pub message: String,
    pub dispute: DisputeResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDisputeResponse {
    pub success: bool,
    pub message: String,
    pub new_job_status: String,
    pub new_payment_status: String,
    pub dispute: DisputeResponse,
    /// Processor calls made, each with its final outbox status.
    pub settlements: Vec<SettlementResponse>,
    /// Calls the action called for but could not be made.
    pub skipped: Vec<SkippedResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub open: u64,
    pub under_review: u64,
    pub resolving: u64,
    pub resolved: u64,
    pub all: u64,
}

impl From<&DisputeCounts> for StatsResponse {
    fn from(c: &DisputeCounts) -> Self {
        Self {
            open: c.get(DisputeStatus::Open),
            under_review: c.get(DisputeStatus::UnderReview),
            resolving: c.get(DisputeStatus::Resolving),
            resolved: c.get(DisputeStatus::Resolved),
            all: c.total(),
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/disputes", post(file_dispute).get(list_disputes))
        .route("/v1/disputes/resolve", post(resolve_dispute))
        .route("/v1/disputes/stats", get(dispute_stats))
        .route("/v1/disputes/:id", get(get_dispute))
        .route("/v1/disputes/:id/review", post(review_dispute))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/disputes
#[utoipa::path(
    post,
    path = "/v1/disputes",
    request_body = FileDisputeRequest,
    responses(
        (status = 200, description = "Dispute filed; job and payment hold frozen", body = FileDisputeResponse),
        (status = 400, description = "Missing fields, job not in progress, or an active dispute exists", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the named party on the job", body = crate::error::ErrorBody),
        (status = 404, description = "Job not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn file_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<FileDisputeRequest>, JsonRejection>,
) -> Result<Json<FileDisputeResponse>, AppError> {
    let req = extract_validated_json(body)?;

    let filer_role: PartyRole = req.user_type.trim().parse()?;
    if let Some(token_role) = caller.role.party_role() {
        if token_role != filer_role {
            return Err(AppError::Forbidden(format!(
                "a {} token cannot file as {}",
                caller.role.as_str(),
                filer_role
            )));
        }
    }
    let job_id: JobId = parse_id(&req.job_id, "jobId")?;
    let claimed = req
        .user_id
        .as_deref()
        .map(|raw| parse_id::<UserId>(raw, "userId"))
        .transpose()?;
    let filer_id = caller.acting_user(claimed)?;
    let reason = DisputeReason::parse(&req.reason)?;

    let dispute = state
        .filing
        .file(FileDispute {
            job_id,
            filer_id,
            filer_role,
            reason,
            description: req.description,
        })
        .await?;
    state.metrics.dispute_filed(filer_role.as_str());

    Ok(Json(FileDisputeResponse {
        success: true,
        message: "Dispute created successfully".into(),
        dispute: DisputeResponse::from(&dispute),
    }))
}

/// Amounts are read only for `partial_refund`; other actions ignore them.
fn resolution_action(req: &ResolveDisputeRequest) -> Result<(ResolutionKind, ResolutionAction), AppError> {
    let kind: ResolutionKind = req.action.trim().parse()?;
    if kind != ResolutionKind::PartialRefund {
        return Ok((kind, ResolutionAction::from_parts(kind, None, None)?));
    }
    let contractor_amount = req
        .contractor_amount
        .as_ref()
        .map(|a| a.parse("contractorAmount"))
        .transpose()?;
    let homeowner_refund = req
        .homeowner_refund
        .as_ref()
        .map(|a| a.parse("homeownerRefund"))
        .transpose()?;
    Ok((kind, ResolutionAction::from_parts(kind, contractor_amount, homeowner_refund)?))
}

/// POST /v1/disputes/resolve
#[utoipa::path(
    post,
    path = "/v1/disputes/resolve",
    request_body = ResolveDisputeRequest,
    responses(
        (status = 200, description = "Dispute resolved; settlement outcome included", body = ResolveDisputeResponse),
        (status = 400, description = "Invalid request or dispute already resolved", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not resolve disputes", body = crate::error::ErrorBody),
        (status = 404, description = "Dispute or job not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn resolve_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ResolveDisputeRequest>, JsonRejection>,
) -> Result<Json<ResolveDisputeResponse>, AppError> {
    require_admin(&caller)?;
    let req = extract_validated_json(body)?;

    let dispute_id: DisputeId = parse_id(&req.dispute_id, "disputeId")?;
    let (kind, action) = resolution_action(&req)?;
    let confirm_hold_status = req
        .confirm_hold_status
        .as_deref()
        .map(|s| s.trim().parse::<HoldStatus>())
        .transpose()?;
    let claimed = req
        .admin_id
        .as_deref()
        .map(|raw| parse_id::<UserId>(raw, "adminId"))
        .transpose()?;
    let admin_id = caller.acting_user(claimed)?;

    let outcome = state
        .resolver
        .resolve(ResolveDispute {
            dispute_id,
            action,
            resolution: req.resolution,
            admin_notes: req.admin_notes,
            admin_id,
            confirm_hold_status,
        })
        .await?;
    state.metrics.dispute_resolved(kind.as_str());
    state.metrics.settlements(&outcome.settlements);

    Ok(Json(ResolveDisputeResponse {
        success: true,
        message: "Dispute resolved successfully".into(),
        new_job_status: outcome.new_job_status.as_str().to_string(),
        new_payment_status: outcome.new_payment_status.as_str().to_string(),
        dispute: DisputeResponse::from(&outcome.dispute),
        settlements: outcome.settlements.iter().map(SettlementResponse::from).collect(),
        skipped: outcome.skipped.iter().map(SkippedResponse::from).collect(),
    }))
}

/// POST /v1/disputes/:id/review
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/review",
    params(("id" = String, Path, description = "Dispute UUID")),
    request_body = ReviewDisputeRequest,
    responses(
        (status = 200, description = "Dispute is under review", body = DisputeResponse),
        (status = 400, description = "Dispute already resolved", body = crate::error::ErrorBody),
        (status = 404, description = "Dispute not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn review_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<ReviewDisputeRequest>, JsonRejection>,
) -> Result<Json<DisputeResponse>, AppError> {
    require_admin(&caller)?;
    let req = extract_validated_json(body)?;
    let dispute_id: DisputeId = parse_id(&id, "dispute id")?;
    let claimed = req
        .admin_id
        .as_deref()
        .map(|raw| parse_id::<UserId>(raw, "adminId"))
        .transpose()?;
    let admin_id = caller.acting_user(claimed)?;

    let dispute = state.resolver.claim_for_review(&dispute_id, &admin_id).await?;
    Ok(Json(DisputeResponse::from(&dispute)))
}

/// GET /v1/disputes/:id
#[utoipa::path(
    get,
    path = "/v1/disputes/{id}",
    params(("id" = String, Path, description = "Dispute UUID")),
    responses(
        (status = 200, description = "Dispute found", body = DisputeResponse),
        (status = 403, description = "Caller is not a party to the job", body = crate::error::ErrorBody),
        (status = 404, description = "Dispute not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn get_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<DisputeResponse>, AppError> {
    let dispute_id: DisputeId = parse_id(&id, "dispute id")?;
    let dispute = read(&state, state.store.get_dispute(&dispute_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dispute {dispute_id} not found")))?;

    if !caller.is_admin() {
        let job = read(&state, state.store.get_job(&dispute.job_id)).await?;
        let is_party = match (job, caller.user_id) {
            (Some(job), Some(user)) => job.role_of(&user) == caller.role.party_role(),
            _ => false,
        };
        if !is_party {
            return Err(AppError::Forbidden("only the job's parties may view this dispute".into()));
        }
    }
    Ok(Json(DisputeResponse::from(&dispute)))
}

/// GET /v1/disputes
#[utoipa::path(
    get,
    path = "/v1/disputes",
    params(ListDisputesQuery),
    responses(
        (status = 200, description = "Disputes, newest first", body = Vec<DisputeResponse>),
    ),
    tag = "disputes"
)]
pub async fn list_disputes(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListDisputesQuery>, QueryRejection>,
) -> Result<Json<Vec<DisputeResponse>>, AppError> {
    require_admin(&caller)?;
    let q = extract_query(query)?;
    let filter = DisputeFilter {
        status: q.status.as_deref().map(str::parse::<DisputeStatus>).transpose()?,
        job_id: q.job_id.as_deref().map(|raw| parse_id::<JobId>(raw, "jobId")).transpose()?,
        limit: Some(page_size(q.limit)),
    };
    let disputes = read(&state, state.store.list_disputes(&filter)).await?;
    Ok(Json(disputes.iter().map(DisputeResponse::from).collect()))
}

/// GET /v1/disputes/stats
#[utoipa::path(
    get,
    path = "/v1/disputes/stats",
    responses(
        (status = 200, description = "Dispute counts by status", body = StatsResponse),
    ),
    tag = "disputes"
)]
pub async fn dispute_stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<StatsResponse>, AppError> {
    require_admin(&caller)?;
    let counts = read(&state, state.store.count_disputes()).await?;
    state.metrics.set_dispute_counts(&counts);
    Ok(Json(StatsResponse::from(&counts)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_accept_numbers_and_strings() {
        let n: AmountInput = serde_json::from_str("200").unwrap();
        assert_eq!(n.parse("x").unwrap().minor_units(), 20_000);

        let f: AmountInput = serde_json::from_str("199.99").unwrap();
        assert_eq!(f.parse("x").unwrap().minor_units(), 19_999);

        let s: AmountInput = serde_json::from_str("\"250.5\"").unwrap();
        assert_eq!(s.parse("x").unwrap().minor_units(), 25_050);
    }

    #[test]
    fn negative_amount_is_rejected() {
        let n: AmountInput = serde_json::from_str("-5").unwrap();
        let err = n.parse("homeownerRefund").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("homeownerRefund")));
    }

    fn resolve_request(body: &str) -> ResolveDisputeRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn amounts_are_ignored_outside_partial_refund() {
        let req = resolve_request(
            r#"{"disputeId":"d","action":"release_to_contractor","resolution":"ok","contractorAmount":"abc","homeownerRefund":-5}"#,
        );
        let (kind, action) = resolution_action(&req).unwrap();
        assert_eq!(kind, ResolutionKind::ReleaseToContractor);
        assert_eq!(action, ResolutionAction::ReleaseToContractor);

        let req = resolve_request(r#"{"disputeId":"d","action":"dismissed","resolution":"ok","homeownerRefund":"1e9"}"#);
        assert_eq!(resolution_action(&req).unwrap().1, ResolutionAction::Dismissed);
    }

    #[test]
    fn partial_refund_amounts_are_checked() {
        let req = resolve_request(
            r#"{"disputeId":"d","action":"partial_refund","resolution":"split","contractorAmount":"abc","homeownerRefund":250}"#,
        );
        let err = resolution_action(&req).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("contractorAmount")));

        let req = resolve_request(
            r#"{"disputeId":"d","action":"partial_refund","resolution":"split","contractorAmount":200,"homeownerRefund":"250.00"}"#,
        );
        let (_, action) = resolution_action(&req).unwrap();
        let (contractor, refund) = action.split();
        assert_eq!(contractor.map(|a| a.minor_units()), Some(20_000));
        assert_eq!(refund.map(|a| a.minor_units()), Some(25_000));
    }

    #[test]
    fn missing_fields_fail_validation() {
        let req: FileDisputeRequest = serde_json::from_str(r#"{"jobId":"x","reason":""}"#).unwrap();
        assert!(req.validate().unwrap_err().contains("jobId, reason, userType"));

        let req: ResolveDisputeRequest =
            serde_json::from_str(r#"{"disputeId":"d","action":"dismissed","resolution":"   "}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn stats_sum_all_statuses() {
        let mut counts = std::collections::HashMap::new();
        counts.insert(DisputeStatus::Open, 2);
        counts.insert(DisputeStatus::Resolved, 5);
        let stats = StatsResponse::from(&DisputeCounts(counts));
        assert_eq!(stats.open, 2);
        assert_eq!(stats.under_review, 0);
        assert_eq!(stats.all, 7);
    }
}
