// SPDX-License-Identifier: BUSL-1.1
//! # Store Port
//!
//! Durable persistence for jobs, payment holds, disputes and settlement
//! operations. Two implementations exist: [`crate::MemoryStore`] here and a
//! PostgreSQL store in the API crate.
//!
//! ## Atomicity contract
//!
//! - [`EscrowStore::create_dispute`] inserts the dispute, moves the job to
//!   `on_hold` and freezes the hold as one unit, and only if the job has no
//!   active dispute and is still `in_progress`.
//! - [`EscrowStore::update_dispute_status`] is compare-and-set: it succeeds
//!   for exactly one caller when several race on the same expected status.
//! - [`EscrowStore::record_resolution`] succeeds only from `resolving`.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{DisputeId, JobId, PaymentHoldId, UserId};

use crate::dispute::{Dispute, DisputeStatus, ResolutionRecord};
use crate::error::StoreError;
use crate::hold::{HoldStatus, PaymentHold};
use crate::job::{Job, JobStatus};
use crate::settlement::{SettlementOperation, SettlementStatus};

/// Criteria for [`EscrowStore::list_disputes`]. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisputeFilter {
    pub status: Option<DisputeStatus>,
    pub job_id: Option<JobId>,
    pub limit: Option<usize>,
}

/// Dispute counts keyed by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisputeCounts(pub HashMap<DisputeStatus, u64>);

impl DisputeCounts {
    pub fn get(&self, status: DisputeStatus) -> u64 {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

#[async_trait]
pub trait EscrowStore: Send + Sync {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// The hold securing `job_id`, if payment was authorized.
    async fn get_payment_hold(&self, job_id: &JobId) -> Result<Option<PaymentHold>, StoreError>;

    async fn get_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, StoreError>;

    /// The dispute on `job_id` whose status is not `resolved`, if any.
    async fn find_active_dispute(&self, job_id: &JobId) -> Result<Option<Dispute>, StoreError>;

    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError>;

    async fn count_disputes(&self) -> Result<DisputeCounts, StoreError>;

    /// The contractor's connected payout account, if onboarded.
    async fn payout_destination(&self, provider: &UserId) -> Result<Option<String>, StoreError>;

    /// Insert an `open` dispute and freeze its job and hold. See the module
    /// docs for the conditions; a lost race yields
    /// [`StoreError::ActiveDisputeExists`] or [`StoreError::JobStatusChanged`].
    async fn create_dispute(&self, dispute: &Dispute) -> Result<(), StoreError>;

    /// Compare-and-set on the dispute status. Returns the updated record
    /// when the current status was in `expected`, `None` otherwise.
    async fn update_dispute_status(
        &self,
        id: &DisputeId,
        expected: &[DisputeStatus],
        next: DisputeStatus,
        actor: Option<UserId>,
    ) -> Result<Option<Dispute>, StoreError>;

    /// Append the resolution and move `resolving → resolved`.
    async fn record_resolution(&self, id: &DisputeId, record: &ResolutionRecord) -> Result<Dispute, StoreError>;

    async fn update_job_status(&self, id: &JobId, status: JobStatus) -> Result<(), StoreError>;

    async fn update_payment_hold_status(
        &self,
        id: &PaymentHoldId,
        status: HoldStatus,
        released_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn insert_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError>;

    async fn update_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError>;

    /// Least recently updated first, so each reconciliation pass reaches
    /// the operations it has waited longest to retry.
    async fn list_settlements(
        &self,
        status: Option<SettlementStatus>,
        limit: usize,
    ) -> Result<Vec<SettlementOperation>, StoreError>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Run a store call under a deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
