// SPDX-License-Identifier: BUSL-1.1
//! # Dispute Records
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──▶ UnderReview ──▶ Resolving ──▶ Resolved
//!   │                          ▲
//!   └──────────────────────────┘
//! ```
//!
//! `Resolving` is the claim marker taken by exactly one resolution call
//! before any money moves. `Open`, `UnderReview` and `Resolving` all count as
//! active: a job has at most one active dispute. Dismissal is a resolution
//! action, not a status; a dismissed dispute is `Resolved`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use hearth_core::{Amount, DisputeId, JobId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DisputeError;
use crate::job::PartyRole;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolving,
    Resolved,
}

impl DisputeStatus {
    pub const ALL: [DisputeStatus; 4] = [
        Self::Open,
        Self::UnderReview,
        Self::Resolving,
        Self::Resolved,
    ];

    /// Statuses from which a resolution may be claimed.
    pub const RESOLVABLE: [DisputeStatus; 2] = [Self::Open, Self::UnderReview];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::UnderReview => "under_review",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Resolved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved)
    }

    pub fn valid_transitions(&self) -> &'static [DisputeStatus] {
        match self {
            Self::Open => &[Self::UnderReview, Self::Resolving],
            Self::UnderReview => &[Self::Resolving],
            // Back to Open/UnderReview only when a claim is rolled back.
            Self::Resolving => &[Self::Resolved, Self::Open, Self::UnderReview],
            Self::Resolved => &[],
        }
    }

    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DisputeError::Validation(format!("unknown dispute status {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Reason
// ---------------------------------------------------------------------------

/// Closed set of reasons a party may give when filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    WorkNotCompleted,
    QualityIssues,
    ContractorNoShow,
    PriceDisagreement,
    SafetyConcern,
    Other,
}

impl DisputeReason {
    pub const ALL: [DisputeReason; 6] = [
        Self::WorkNotCompleted,
        Self::QualityIssues,
        Self::ContractorNoShow,
        Self::PriceDisagreement,
        Self::SafetyConcern,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkNotCompleted => "work_not_completed",
            Self::QualityIssues => "quality_issues",
            Self::ContractorNoShow => "contractor_no_show",
            Self::PriceDisagreement => "price_disagreement",
            Self::SafetyConcern => "safety_concern",
            Self::Other => "other",
        }
    }

    /// Label shown to users and used in notices.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WorkNotCompleted => "Work not completed",
            Self::QualityIssues => "Quality issues",
            Self::ContractorNoShow => "Contractor no-show",
            Self::PriceDisagreement => "Price disagreement",
            Self::SafetyConcern => "Safety concern",
            Self::Other => "Other",
        }
    }

    /// Accepts the snake_case value or the label, case-insensitively.
    pub fn parse(input: &str) -> Result<Self, DisputeError> {
        let needle = input.trim();
        if needle.is_empty() {
            return Err(DisputeError::Validation("reason is required".into()));
        }
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(needle) || r.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| DisputeError::Validation(format!("unknown dispute reason {needle:?}")))
    }
}

impl std::fmt::Display for DisputeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Payload-free tag of a resolution action, as stored and sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    ReleaseToContractor,
    RefundHomeowner,
    PartialRefund,
    Dismissed,
}

impl ResolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReleaseToContractor => "release_to_contractor",
            Self::RefundHomeowner => "refund_homeowner",
            Self::PartialRefund => "partial_refund",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionKind {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release_to_contractor" => Ok(Self::ReleaseToContractor),
            "refund_homeowner" => Ok(Self::RefundHomeowner),
            "partial_refund" => Ok(Self::PartialRefund),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(DisputeError::Validation(format!(
                "invalid action {other:?}: expected release_to_contractor, refund_homeowner, partial_refund or dismissed"
            ))),
        }
    }
}

/// The administrative decision appended to a resolved dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub text: String,
    pub action: ResolutionKind,
    /// Present only for `partial_refund`.
    pub contractor_amount: Option<Amount>,
    /// Present only for `partial_refund`.
    pub homeowner_refund: Option<Amount>,
    pub resolved_by: UserId,
    pub resolved_at: DateTime<Utc>,
    pub admin_notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub job_id: JobId,
    pub filed_by: UserId,
    pub filer_role: PartyRole,
    pub reason: DisputeReason,
    pub description: Option<String>,
    pub status: DisputeStatus,
    /// Admin who moved the dispute to `under_review`.
    pub reviewed_by: Option<UserId>,
    pub resolution: Option<ResolutionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    /// A freshly filed dispute in `Open`.
    pub fn open(
        job_id: JobId,
        filed_by: UserId,
        filer_role: PartyRole,
        reason: DisputeReason,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DisputeId::new(),
            job_id,
            filed_by,
            filer_role,
            reason,
            description,
            status: DisputeStatus::Open,
            reviewed_by: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: DisputeStatus, now: DateTime<Utc>) -> Result<(), DisputeError> {
        if !self.status.can_transition_to(next) {
            return Err(DisputeError::StateConflict(format!(
                "dispute {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Append the resolution and close. Only valid from `Resolving`.
    pub fn resolve(&mut self, record: ResolutionRecord) -> Result<(), DisputeError> {
        if self.status != DisputeStatus::Resolving {
            return Err(DisputeError::StateConflict(format!(
                "dispute {} must be claimed before it is resolved (status {})",
                self.id, self.status
            )));
        }
        self.updated_at = record.resolved_at;
        self.status = DisputeStatus::Resolved;
        self.resolution = Some(record);
        Ok(())
    }
}
