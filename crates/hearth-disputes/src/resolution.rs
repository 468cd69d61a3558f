// SPDX-License-Identifier: BUSL-1.1
//! # Dispute Resolution Orchestrator
//!
//! Applies an administrator's decision to a dispute, its job and its
//! payment hold.
//!
//! ## Sequence
//!
//! ```text
//! validate ─▶ load ─▶ plan ─▶ claim (CAS → resolving) ─▶ settle ─▶ commit ─▶ notify
//! ```
//!
//! - Everything before the claim is read-only. Validation, authorization,
//!   not-found and conflict errors leave no trace.
//! - The claim is a compare-and-set from `open`/`under_review` to
//!   `resolving`. Exactly one concurrent caller wins; the rest get
//!   `StateConflict` and never reach the processor.
//! - Each processor call is preceded by an `intended` settlement record and
//!   followed by `confirmed` or `failed`. A failed call does not stop the
//!   resolution; the reconciler retries it later.
//! - The commit writes dispute, then job, then hold, so a reader who sees
//!   the dispute resolved never sees the job still on hold.
//! - A store failure stops progress and surfaces as `Persistence`.

use std::sync::Arc;

use chrono::Utc;
use hearth_core::{DisputeId, UserId};
use hearth_gateway::{DisputeResolvedNotice, Notifier, PaymentProcessor};
use serde::Serialize;

use crate::allocation::{self, AllocationInput, ResolutionAction, SettlementPlan, SkippedOperation};
use crate::config::CoreConfig;
use crate::dispute::{Dispute, DisputeStatus, ResolutionKind, ResolutionRecord};
use crate::error::DisputeError;
use crate::executor::SettlementExecutor;
use crate::gate::AuthorizationGate;
use crate::hold::HoldStatus;
use crate::job::{Job, JobStatus};
use crate::notices;
use crate::settlement::SettlementOperation;
use crate::store::{bounded, EscrowStore};

/// An administrator's decision on one dispute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveDispute {
    pub dispute_id: DisputeId,
    pub action: ResolutionAction,
    pub resolution: String,
    pub admin_notes: Option<String>,
    pub admin_id: UserId,
    /// Hold status to restore on dismissal when none was recorded at filing.
    pub confirm_hold_status: Option<HoldStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionOutcome {
    pub dispute: Dispute,
    pub new_job_status: JobStatus,
    pub new_payment_status: HoldStatus,
    /// Operations attempted, with their final status.
    pub settlements: Vec<SettlementOperation>,
    pub skipped: Vec<SkippedOperation>,
}

pub struct ResolutionOrchestrator {
    store: Arc<dyn EscrowStore>,
    executor: SettlementExecutor,
    gate: Arc<dyn AuthorizationGate>,
    notifier: Arc<dyn Notifier>,
    config: CoreConfig,
}

impl ResolutionOrchestrator {
    pub fn new(
        store: Arc<dyn EscrowStore>,
        processor: Arc<dyn PaymentProcessor>,
        gate: Arc<dyn AuthorizationGate>,
        notifier: Arc<dyn Notifier>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            executor: SettlementExecutor::new(processor, config.processor_timeout),
            gate,
            notifier,
            config,
        }
    }

    async fn require_admin(&self, admin: &UserId) -> Result<(), DisputeError> {
        if self.gate.can_resolve_disputes(admin).await {
            Ok(())
        } else {
            tracing::warn!(admin_id = %admin, "dispute administration refused by authorization gate");
            Err(DisputeError::Forbidden(
                "caller is not permitted to administer disputes".into(),
            ))
        }
    }

    fn require_resolvable(dispute: &Dispute) -> Result<(), DisputeError> {
        match dispute.status {
            DisputeStatus::Open | DisputeStatus::UnderReview => Ok(()),
            closed => Err(Self::closed_conflict(closed)),
        }
    }

    fn closed_conflict(status: DisputeStatus) -> DisputeError {
        if status == DisputeStatus::Resolving {
            DisputeError::StateConflict("dispute is being resolved by another request".into())
        } else {
            DisputeError::StateConflict("dispute already resolved".into())
        }
    }

    /// Move an open dispute to `under_review`. Repeating the call is a no-op.
    pub async fn claim_for_review(&self, dispute_id: &DisputeId, admin_id: &UserId) -> Result<Dispute, DisputeError> {
        let limit = self.config.store_timeout;
        self.require_admin(admin_id).await?;

        let dispute = bounded(limit, self.store.get_dispute(dispute_id))
            .await?
            .ok_or_else(|| DisputeError::not_found("dispute", dispute_id))?;

        match dispute.status {
            DisputeStatus::UnderReview => Ok(dispute),
            DisputeStatus::Open => {
                let claimed = bounded(
                    limit,
                    self.store.update_dispute_status(
                        dispute_id,
                        &[DisputeStatus::Open],
                        DisputeStatus::UnderReview,
                        Some(*admin_id),
                    ),
                )
                .await?;
                match claimed {
                    Some(d) => {
                        tracing::info!(dispute_id = %dispute_id, admin_id = %admin_id, "dispute under review");
                        Ok(d)
                    }
                    // Lost a race: fine if the winner also moved it to review.
                    None => {
                        let current = bounded(limit, self.store.get_dispute(dispute_id))
                            .await?
                            .ok_or_else(|| DisputeError::not_found("dispute", dispute_id))?;
                        match current.status {
                            DisputeStatus::UnderReview => Ok(current),
                            other => Err(Self::closed_conflict(other)),
                        }
                    }
                }
            }
            closed => Err(Self::closed_conflict(closed)),
        }
    }

    pub async fn resolve(&self, command: ResolveDispute) -> Result<ResolutionOutcome, DisputeError> {
        let limit = self.config.store_timeout;

        let resolution_text = command.resolution.trim().to_string();
        if resolution_text.is_empty() {
            return Err(DisputeError::Validation("resolution text is required".into()));
        }
        self.require_admin(&command.admin_id).await?;

        let dispute = bounded(limit, self.store.get_dispute(&command.dispute_id))
            .await?
            .ok_or_else(|| DisputeError::not_found("dispute", command.dispute_id))?;
        Self::require_resolvable(&dispute)?;

        let job = bounded(limit, self.store.get_job(&dispute.job_id))
            .await?
            .ok_or_else(|| DisputeError::not_found("job", dispute.job_id))?;
        let hold = bounded(limit, self.store.get_payment_hold(&job.id)).await?;
        let destination = match job.provider_id {
            Some(provider) => bounded(limit, self.store.payout_destination(&provider)).await?,
            None => None,
        };

        let plan = allocation::plan(
            &command.action,
            AllocationInput {
                hold: hold.as_ref(),
                payout_destination: destination.as_deref(),
                confirmed_hold_status: command.confirm_hold_status,
            },
        )?;

        // Claim. Only the winner proceeds to move money.
        let prior_status = dispute.status;
        let claimed = bounded(
            limit,
            self.store.update_dispute_status(
                &dispute.id,
                &DisputeStatus::RESOLVABLE,
                DisputeStatus::Resolving,
                Some(command.admin_id),
            ),
        )
        .await?;
        if claimed.is_none() {
            return Err(DisputeError::StateConflict(
                "dispute was claimed by a concurrent resolution".into(),
            ));
        }
        tracing::info!(
            dispute_id = %dispute.id,
            admin_id = %command.admin_id,
            action = command.action.kind().as_str(),
            "dispute claimed for resolution"
        );

        for skipped in &plan.skipped {
            tracing::warn!(
                dispute_id = %dispute.id,
                kind = %skipped.kind,
                reason = %skipped.reason,
                "settlement operation skipped"
            );
        }

        let currency = hold
            .as_ref()
            .map(|h| h.currency.clone())
            .unwrap_or_else(|| self.config.currency.clone());
        let settlements = self.settle(&dispute, &plan, &currency, prior_status).await?;

        let (contractor_amount, homeowner_refund) = command.action.split();
        let now = Utc::now();
        let record = ResolutionRecord {
            text: resolution_text.clone(),
            action: command.action.kind(),
            contractor_amount,
            homeowner_refund,
            resolved_by: command.admin_id,
            resolved_at: now,
            admin_notes: command
                .admin_notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };

        let resolved = bounded(limit, self.store.record_resolution(&dispute.id, &record)).await?;
        bounded(limit, self.store.update_job_status(&job.id, plan.target_job_status)).await?;
        if let Some(hold) = &hold {
            let released_at = (record.action != ResolutionKind::Dismissed).then_some(now);
            bounded(
                limit,
                self.store
                    .update_payment_hold_status(&hold.id, plan.target_hold_status, released_at),
            )
            .await?;
        }

        tracing::info!(
            dispute_id = %dispute.id,
            job_id = %job.id,
            action = record.action.as_str(),
            job_status = %plan.target_job_status,
            hold_status = %plan.target_hold_status,
            "dispute resolved"
        );

        self.notify_parties(&job, &resolved, &resolution_text);

        Ok(ResolutionOutcome {
            dispute: resolved,
            new_job_status: plan.target_job_status,
            new_payment_status: plan.target_hold_status,
            settlements,
            skipped: plan.skipped,
        })
    }

    /// Refund first, then transfer. Each is recorded before it is sent.
    async fn settle(
        &self,
        dispute: &Dispute,
        plan: &SettlementPlan,
        currency: &str,
        prior_status: DisputeStatus,
    ) -> Result<Vec<SettlementOperation>, DisputeError> {
        let limit = self.config.store_timeout;

        let mut ops = Vec::new();
        if let Some(refund) = &plan.refund {
            ops.push(SettlementOperation::refund(dispute.id, dispute.job_id, refund, currency));
        }
        if let Some(transfer) = &plan.transfer {
            ops.push(SettlementOperation::transfer(dispute.id, dispute.job_id, transfer, currency));
        }

        let mut moved_money = false;
        for op in &mut ops {
            if let Err(e) = bounded(limit, self.store.insert_settlement(op)).await {
                if !moved_money {
                    self.release_claim(dispute, prior_status).await;
                }
                return Err(e.into());
            }
            self.executor.execute(op).await;
            moved_money = true;
            bounded(limit, self.store.update_settlement(op)).await?;
        }
        Ok(ops)
    }

    /// Best-effort rollback of the claim when nothing was sent.
    async fn release_claim(&self, dispute: &Dispute, prior_status: DisputeStatus) {
        let result = bounded(
            self.config.store_timeout,
            self.store.update_dispute_status(
                &dispute.id,
                &[DisputeStatus::Resolving],
                prior_status,
                None,
            ),
        )
        .await;
        if let Err(e) = result {
            tracing::error!(
                dispute_id = %dispute.id,
                error = %e,
                "failed to release resolution claim; dispute left in resolving"
            );
        }
    }

    fn notify_parties(&self, job: &Job, dispute: &Dispute, resolution: &str) {
        let action = dispute
            .resolution
            .as_ref()
            .map(|r| r.action.as_str())
            .unwrap_or_default()
            .to_string();
        let notices = job
            .parties()
            .into_iter()
            .map(|recipient| DisputeResolvedNotice {
                recipient,
                dispute_id: dispute.id,
                job_id: job.id,
                job_title: job.title.clone(),
                action: action.clone(),
                resolution: resolution.to_string(),
            })
            .collect();
        notices::spawn_resolved(self.notifier.clone(), notices);
    }
}
