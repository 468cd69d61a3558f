// SPDX-License-Identifier: BUSL-1.1
//! # Settlement Outbox
//!
//! Every processor call made on behalf of a resolution is preceded by a
//! persisted [`SettlementOperation`] in `intended`, and followed by an update
//! to `confirmed` or `failed`. Failed and stale intended operations are what
//! the [`crate::Reconciler`] retries. An operation the processor refused, or
//! one that ran out of attempts, is `abandoned` and needs an operator.
//!
//! The idempotency key is derived from the dispute and the operation kind,
//! so every retry of the same movement reaches the processor under the same
//! key.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use hearth_core::{Amount, DisputeId, JobId, SettlementId};
use hearth_gateway::{RefundRequest, SettlementMetadata, TransferRequest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::allocation::{PlannedRefund, PlannedTransfer};
use crate::error::DisputeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Transfer,
    Refund,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Refund => "refund",
        }
    }
}

impl std::fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementKind {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(Self::Transfer),
            "refund" => Ok(Self::Refund),
            other => Err(DisputeError::Validation(format!("unknown settlement kind {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Intended,
    Confirmed,
    Failed,
    /// Not retried again.
    Abandoned,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intended => "intended",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intended" => Ok(Self::Intended),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(DisputeError::Validation(format!(
                "unknown settlement status {other:?}"
            ))),
        }
    }
}

/// Hex SHA-256 of `"{dispute_id}:{kind}"`.
pub fn idempotency_key(dispute_id: &DisputeId, kind: SettlementKind) -> String {
    let digest = Sha256::digest(format!("{dispute_id}:{}", kind.as_str()).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOperation {
    pub id: SettlementId,
    pub dispute_id: DisputeId,
    pub job_id: JobId,
    pub kind: SettlementKind,
    /// `None` on a refund means the full captured amount.
    pub amount: Option<Amount>,
    pub currency: String,
    /// Destination account for transfers, charge reference for refunds.
    pub target_ref: String,
    /// Metadata tag: `full_release`, `full_refund`, `partial_refund`,
    /// `partial_release`.
    pub resolution_tag: String,
    pub idempotency_key: String,
    pub status: SettlementStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub receipt_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementOperation {
    pub fn transfer(dispute_id: DisputeId, job_id: JobId, planned: &PlannedTransfer, currency: &str) -> Self {
        Self::intended(
            dispute_id,
            job_id,
            SettlementKind::Transfer,
            Some(planned.amount),
            currency,
            planned.destination.clone(),
            planned.resolution_tag,
        )
    }

    pub fn refund(dispute_id: DisputeId, job_id: JobId, planned: &PlannedRefund, currency: &str) -> Self {
        Self::intended(
            dispute_id,
            job_id,
            SettlementKind::Refund,
            planned.amount,
            currency,
            planned.processor_ref.clone(),
            planned.resolution_tag,
        )
    }

    fn intended(
        dispute_id: DisputeId,
        job_id: JobId,
        kind: SettlementKind,
        amount: Option<Amount>,
        currency: &str,
        target_ref: String,
        resolution_tag: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SettlementId::new(),
            dispute_id,
            job_id,
            kind,
            amount,
            currency: currency.to_string(),
            target_ref,
            resolution_tag: resolution_tag.to_string(),
            idempotency_key: idempotency_key(&dispute_id, kind),
            status: SettlementStatus::Intended,
            attempts: 0,
            last_error: None,
            receipt_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn metadata(&self) -> SettlementMetadata {
        SettlementMetadata {
            job_id: self.job_id,
            dispute_id: self.dispute_id,
            resolution: self.resolution_tag.clone(),
        }
    }

    /// Processor request for a transfer operation.
    pub fn transfer_request(&self) -> Option<TransferRequest> {
        match (self.kind, self.amount) {
            (SettlementKind::Transfer, Some(amount)) => Some(TransferRequest {
                amount,
                currency: self.currency.clone(),
                destination: self.target_ref.clone(),
                idempotency_key: self.idempotency_key.clone(),
                metadata: self.metadata(),
            }),
            _ => None,
        }
    }

    /// Processor request for a refund operation.
    pub fn refund_request(&self) -> Option<RefundRequest> {
        match self.kind {
            SettlementKind::Refund => Some(RefundRequest {
                processor_ref: self.target_ref.clone(),
                amount: self.amount,
                idempotency_key: self.idempotency_key.clone(),
                metadata: self.metadata(),
            }),
            SettlementKind::Transfer => None,
        }
    }

    pub fn mark_confirmed(&mut self, receipt_id: String) {
        self.attempts += 1;
        self.status = SettlementStatus::Confirmed;
        self.receipt_id = Some(receipt_id);
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.attempts += 1;
        self.status = SettlementStatus::Failed;
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }

    /// Take a failed operation out of the retry set. Keeps `last_error`.
    pub fn mark_abandoned(&mut self) {
        self.status = SettlementStatus::Abandoned;
        self.updated_at = Utc::now();
    }
}
