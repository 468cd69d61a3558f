// SPDX-License-Identifier: BUSL-1.1
//! # In-Memory Store
//!
//! [`EscrowStore`] over `parking_lot::RwLock`-guarded maps. All tables sit
//! behind one lock so multi-record effects (filing freezes three records)
//! are applied under a single write guard and no reader sees them half done.
//!
//! Used by tests and by the binary when `DATABASE_URL` is unset. Seeding
//! methods stand in for the job-posting and payment-authorization flows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{DisputeId, JobId, PaymentHoldId, SettlementId, UserId};
use parking_lot::RwLock;

use crate::dispute::{Dispute, DisputeStatus, ResolutionRecord};
use crate::error::StoreError;
use crate::hold::{HoldStatus, PaymentHold};
use crate::job::{Job, JobStatus};
use crate::settlement::{SettlementOperation, SettlementStatus};
use crate::store::{DisputeCounts, DisputeFilter, EscrowStore};

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    holds: HashMap<PaymentHoldId, PaymentHold>,
    disputes: HashMap<DisputeId, Dispute>,
    settlements: HashMap<SettlementId, SettlementOperation>,
    payout_destinations: HashMap<UserId, String>,
}

impl Tables {
    fn hold_for_job_mut(&mut self, job_id: &JobId) -> Option<&mut PaymentHold> {
        self.holds.values_mut().find(|h| h.job_id == *job_id)
    }

    fn active_dispute(&self, job_id: &JobId) -> Option<&Dispute> {
        self.disputes
            .values()
            .find(|d| d.job_id == *job_id && d.status.is_active())
    }
}

/// Thread-safe in-memory store. Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Seeding --------------------------------------------------------

    pub fn insert_job(&self, job: Job) {
        self.tables.write().jobs.insert(job.id, job);
    }

    pub fn insert_hold(&self, hold: PaymentHold) {
        self.tables.write().holds.insert(hold.id, hold);
    }

    pub fn set_payout_destination(&self, provider: UserId, destination: impl Into<String>) {
        self.tables
            .write()
            .payout_destinations
            .insert(provider, destination.into());
    }

    // -- Inspection -----------------------------------------------------

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.tables.read().jobs.get(id).cloned()
    }

    pub fn hold_for_job(&self, job_id: &JobId) -> Option<PaymentHold> {
        self.tables
            .read()
            .holds
            .values()
            .find(|h| h.job_id == *job_id)
            .cloned()
    }

    pub fn disputes_for_job(&self, job_id: &JobId) -> Vec<Dispute> {
        self.tables
            .read()
            .disputes
            .values()
            .filter(|d| d.job_id == *job_id)
            .cloned()
            .collect()
    }

    pub fn settlements_for_dispute(&self, dispute_id: &DisputeId) -> Vec<SettlementOperation> {
        let mut ops: Vec<_> = self
            .tables
            .read()
            .settlements
            .values()
            .filter(|s| s.dispute_id == *dispute_id)
            .cloned()
            .collect();
        ops.sort_by_key(|s| s.created_at);
        ops
    }
}

#[async_trait]
impl EscrowStore for MemoryStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.job(id))
    }

    async fn get_payment_hold(&self, job_id: &JobId) -> Result<Option<PaymentHold>, StoreError> {
        Ok(self.hold_for_job(job_id))
    }

    async fn get_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, StoreError> {
        Ok(self.tables.read().disputes.get(id).cloned())
    }

    async fn find_active_dispute(&self, job_id: &JobId) -> Result<Option<Dispute>, StoreError> {
        Ok(self.tables.read().active_dispute(job_id).cloned())
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError> {
        let tables = self.tables.read();
        let mut out: Vec<Dispute> = tables
            .disputes
            .values()
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| filter.job_id.map_or(true, |j| d.job_id == j))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn count_disputes(&self) -> Result<DisputeCounts, StoreError> {
        let mut counts = DisputeCounts::default();
        for d in self.tables.read().disputes.values() {
            *counts.0.entry(d.status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn payout_destination(&self, provider: &UserId) -> Result<Option<String>, StoreError> {
        Ok(self.tables.read().payout_destinations.get(provider).cloned())
    }

    async fn create_dispute(&self, dispute: &Dispute) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if let Some(existing) = tables.active_dispute(&dispute.job_id) {
            return Err(StoreError::ActiveDisputeExists {
                job_id: dispute.job_id,
                existing: existing.id,
            });
        }
        match tables.jobs.get(&dispute.job_id) {
            None => {
                return Err(StoreError::Missing {
                    entity: "job",
                    id: dispute.job_id.to_string(),
                })
            }
            Some(job) if job.status != JobStatus::InProgress => {
                return Err(StoreError::JobStatusChanged {
                    job_id: dispute.job_id,
                    expected: JobStatus::InProgress.as_str(),
                })
            }
            Some(_) => {}
        }

        let now = Utc::now();
        tables.disputes.insert(dispute.id, dispute.clone());
        if let Some(job) = tables.jobs.get_mut(&dispute.job_id) {
            job.status = JobStatus::OnHold;
            job.updated_at = now;
        }
        if let Some(hold) = tables.hold_for_job_mut(&dispute.job_id) {
            hold.freeze(now);
        }
        Ok(())
    }

    async fn update_dispute_status(
        &self,
        id: &DisputeId,
        expected: &[DisputeStatus],
        next: DisputeStatus,
        actor: Option<UserId>,
    ) -> Result<Option<Dispute>, StoreError> {
        let mut tables = self.tables.write();
        let dispute = tables.disputes.get_mut(id).ok_or_else(|| StoreError::Missing {
            entity: "dispute",
            id: id.to_string(),
        })?;
        if !expected.contains(&dispute.status) {
            return Ok(None);
        }
        dispute.status = next;
        dispute.updated_at = Utc::now();
        if next == DisputeStatus::UnderReview {
            dispute.reviewed_by = actor.or(dispute.reviewed_by);
        }
        Ok(Some(dispute.clone()))
    }

    async fn record_resolution(&self, id: &DisputeId, record: &ResolutionRecord) -> Result<Dispute, StoreError> {
        let mut tables = self.tables.write();
        let dispute = tables.disputes.get_mut(id).ok_or_else(|| StoreError::Missing {
            entity: "dispute",
            id: id.to_string(),
        })?;
        dispute
            .resolve(record.clone())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(dispute.clone())
    }

    async fn update_job_status(&self, id: &JobId, status: JobStatus) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let job = tables.jobs.get_mut(id).ok_or_else(|| StoreError::Missing {
            entity: "job",
            id: id.to_string(),
        })?;
        job.status = status;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_payment_hold_status(
        &self,
        id: &PaymentHoldId,
        status: HoldStatus,
        released_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let hold = tables.holds.get_mut(id).ok_or_else(|| StoreError::Missing {
            entity: "payment hold",
            id: id.to_string(),
        })?;
        hold.status = status;
        if released_at.is_some() {
            hold.released_at = released_at;
        }
        hold.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError> {
        self.tables.write().settlements.insert(op.id, op.clone());
        Ok(())
    }

    async fn update_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        match tables.settlements.get_mut(&op.id) {
            Some(existing) => {
                *existing = op.clone();
                Ok(())
            }
            None => Err(StoreError::Missing {
                entity: "settlement",
                id: op.id.to_string(),
            }),
        }
    }

    async fn list_settlements(
        &self,
        status: Option<SettlementStatus>,
        limit: usize,
    ) -> Result<Vec<SettlementOperation>, StoreError> {
        let mut out: Vec<_> = self
            .tables
            .read()
            .settlements
            .values()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.updated_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
