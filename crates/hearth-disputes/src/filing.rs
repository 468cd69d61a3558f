// SPDX-License-Identifier: BUSL-1.1
//! # Dispute Filing Service
//!
//! Validates a filing, then creates the dispute and freezes the job and its
//! payment hold in one store call. Checks run in a fixed order and stop at
//! the first failure, before anything is written:
//!
//! 1. the job exists;
//! 2. the job is `in_progress`;
//! 3. the gate confirms the filer holds the claimed role on the job;
//! 4. the description fits the configured length;
//! 5. the job has no active dispute.
//!
//! The conditional insert in the store repeats checks 2 and 5 so two
//! concurrent filings cannot both succeed. The other party is then notified
//! on a detached task.

use std::sync::Arc;

use hearth_core::{JobId, UserId};
use hearth_gateway::{DisputeFiledNotice, Notifier};

use crate::config::CoreConfig;
use crate::dispute::{Dispute, DisputeReason};
use crate::error::{DisputeError, StoreError};
use crate::gate::AuthorizationGate;
use crate::job::{JobStatus, PartyRole};
use crate::notices;
use crate::store::{bounded, EscrowStore};

const NOT_IN_PROGRESS: &str = "disputes are only allowed on in-progress jobs";
const ALREADY_ACTIVE: &str = "an active dispute already exists for this job";

/// A request to open a dispute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDispute {
    pub job_id: JobId,
    pub filer_id: UserId,
    pub filer_role: PartyRole,
    pub reason: DisputeReason,
    pub description: Option<String>,
}

pub struct DisputeFilingService {
    store: Arc<dyn EscrowStore>,
    gate: Arc<dyn AuthorizationGate>,
    notifier: Arc<dyn Notifier>,
    config: CoreConfig,
}

impl DisputeFilingService {
    pub fn new(
        store: Arc<dyn EscrowStore>,
        gate: Arc<dyn AuthorizationGate>,
        notifier: Arc<dyn Notifier>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            gate,
            notifier,
            config,
        }
    }

    pub async fn file(&self, request: FileDispute) -> Result<Dispute, DisputeError> {
        let limit = self.config.store_timeout;

        let job = bounded(limit, self.store.get_job(&request.job_id))
            .await?
            .ok_or_else(|| DisputeError::not_found("job", request.job_id))?;

        if job.status != JobStatus::InProgress {
            return Err(DisputeError::Validation(NOT_IN_PROGRESS.into()));
        }

        if !self
            .gate
            .can_act_on_job(&request.filer_id, &job, request.filer_role)
            .await
        {
            tracing::warn!(
                job_id = %job.id,
                filer_id = %request.filer_id,
                role = %request.filer_role,
                "dispute filing refused by authorization gate"
            );
            return Err(DisputeError::Forbidden(format!(
                "only the job's {} can file this dispute",
                request.filer_role
            )));
        }

        let description = match request.description.as_deref().map(str::trim) {
            Some(d) if d.chars().count() > self.config.max_description_len => {
                return Err(DisputeError::Validation(format!(
                    "description must be at most {} characters",
                    self.config.max_description_len
                )))
            }
            Some("") | None => None,
            Some(d) => Some(d.to_string()),
        };

        if bounded(limit, self.store.find_active_dispute(&job.id))
            .await?
            .is_some()
        {
            return Err(DisputeError::Validation(ALREADY_ACTIVE.into()));
        }

        let dispute = Dispute::open(
            job.id,
            request.filer_id,
            request.filer_role,
            request.reason,
            description,
        );

        match bounded(limit, self.store.create_dispute(&dispute)).await {
            Ok(()) => {}
            Err(StoreError::ActiveDisputeExists { .. }) => {
                return Err(DisputeError::Validation(ALREADY_ACTIVE.into()))
            }
            Err(StoreError::JobStatusChanged { .. }) => {
                return Err(DisputeError::Validation(NOT_IN_PROGRESS.into()))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            dispute_id = %dispute.id,
            job_id = %job.id,
            role = %dispute.filer_role,
            reason = dispute.reason.as_str(),
            "dispute filed; job and payment hold frozen"
        );

        match job.party(request.filer_role.other()) {
            Some(recipient) => {
                notices::spawn_filed(
                    self.notifier.clone(),
                    DisputeFiledNotice {
                        recipient,
                        dispute_id: dispute.id,
                        job_id: job.id,
                        job_title: job.title.clone(),
                        reason: dispute.reason.label().to_string(),
                        description: dispute.description.clone(),
                        filed_by: dispute.filed_by,
                        filed_by_role: dispute.filer_role.as_str().to_string(),
                    },
                );
            }
            None => tracing::debug!(job_id = %job.id, "no counterparty to notify"),
        }

        Ok(dispute)
    }
}
