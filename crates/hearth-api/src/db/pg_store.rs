// SPDX-License-Identifier: BUSL-1.1
//! PostgreSQL implementation of [`EscrowStore`].
//!
//! Filing runs in one transaction that locks the job row, inserts the
//! dispute and freezes the job and hold. The partial unique index
//! `disputes_one_active_per_job` backs the one-active-dispute rule. Status
//! changes are conditional `UPDATE ... RETURNING` statements, so the
//! compare-and-set is decided by the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{Amount, DisputeId, JobId, PaymentHoldId, SettlementId, UserId};
use hearth_disputes::{
    Dispute, DisputeCounts, DisputeFilter, DisputeReason, DisputeStatus, EscrowStore, HoldStatus, Job,
    JobStatus, PaymentHold, ResolutionKind, ResolutionRecord, SettlementOperation, SettlementStatus,
    StoreError,
};
use sqlx::PgPool;
use uuid::Uuid;

const ACTIVE_INDEX: &str = "disputes_one_active_per_job";

const JOB_COLUMNS: &str =
    "id, title, status, requester_id, provider_id, final_cost_minor, created_at, updated_at";

const HOLD_COLUMNS: &str = "id, job_id, status, total_amount_minor, platform_fee_minor, provider_payout_minor, \
     currency, processor_ref, pre_dispute_status, released_at, created_at, updated_at";

const DISPUTE_COLUMNS: &str = "id, job_id, filed_by, filer_role, reason, description, status, reviewed_by, \
     resolution_text, resolution_action, contractor_amount_minor, homeowner_refund_minor, \
     resolved_by, resolved_at, admin_notes, created_at, updated_at";

const SETTLEMENT_COLUMNS: &str = "id, dispute_id, job_id, kind, amount_minor, currency, target_ref, \
     resolution_tag, idempotency_key, status, attempts, last_error, receipt_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgEscrowStore {
    pool: PgPool,
}

impl PgEscrowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn dispute_exists(&self, id: &DisputeId) -> Result<bool, StoreError> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM disputes WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(found.is_some())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn corrupt(table: &str, id: Uuid, e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {table} row {id}: {e}"))
}

fn amount(table: &str, id: Uuid, minor: i64) -> Result<Amount, StoreError> {
    Amount::from_minor_units(minor).map_err(|e| corrupt(table, id, e))
}

fn missing(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::Missing {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl EscrowStore for PgEscrowStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(JobRow::into_record).transpose()
    }

    async fn get_payment_hold(&self, job_id: &JobId) -> Result<Option<PaymentHold>, StoreError> {
        let row = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM payment_holds WHERE job_id = $1"
        ))
        .bind(job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(HoldRow::into_record).transpose()
    }

    async fn get_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(DisputeRow::into_record).transpose()
    }

    async fn find_active_dispute(&self, job_id: &JobId) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes
             WHERE job_id = $1 AND status IN ('open', 'under_review', 'resolving')
             LIMIT 1"
        ))
        .bind(job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(DisputeRow::into_record).transpose()
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError> {
        let rows = sqlx::query_as::<_, DisputeRow>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::uuid IS NULL OR job_id = $2)
             ORDER BY created_at DESC
             LIMIT $3"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.job_id.map(|j| *j.as_uuid()))
        .bind(filter.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(DisputeRow::into_record).collect()
    }

    async fn count_disputes(&self) -> Result<DisputeCounts, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM disputes GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        let mut counts = DisputeCounts::default();
        for (status, n) in rows {
            let status: DisputeStatus = status
                .parse()
                .map_err(|e| StoreError::Backend(format!("unknown dispute status in store: {e}")))?;
            counts.0.insert(status, n.max(0) as u64);
        }
        Ok(counts)
    }

    async fn payout_destination(&self, provider: &UserId) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT destination FROM payout_accounts WHERE provider_id = $1")
            .bind(provider.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn create_dispute(&self, dispute: &Dispute) -> Result<(), StoreError> {
        let job_id = *dispute.job_id.as_uuid();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let job_status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        match job_status.as_deref() {
            None => return Err(missing("job", dispute.job_id)),
            Some(s) if s != JobStatus::InProgress.as_str() => {
                return Err(StoreError::JobStatusChanged {
                    job_id: dispute.job_id,
                    expected: JobStatus::InProgress.as_str(),
                })
            }
            Some(_) => {}
        }

        let inserted = sqlx::query(
            "INSERT INTO disputes (id, job_id, filed_by, filer_role, reason, description, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(dispute.id.as_uuid())
        .bind(job_id)
        .bind(dispute.filed_by.as_uuid())
        .bind(dispute.filer_role.as_str())
        .bind(dispute.reason.as_str())
        .bind(dispute.description.as_deref())
        .bind(dispute.status.as_str())
        .bind(dispute.created_at)
        .bind(dispute.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let lost_race = matches!(
                &e,
                sqlx::Error::Database(db) if db.is_unique_violation() && db.constraint() == Some(ACTIVE_INDEX)
            );
            // Roll back before looking up the winner.
            drop(tx);
            if lost_race {
                if let Some(existing) = self.find_active_dispute(&dispute.job_id).await? {
                    return Err(StoreError::ActiveDisputeExists {
                        job_id: dispute.job_id,
                        existing: existing.id,
                    });
                }
            }
            return Err(backend(e));
        }

        sqlx::query("UPDATE jobs SET status = $2, updated_at = now() WHERE id = $1")
            .bind(job_id)
            .bind(JobStatus::OnHold.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        sqlx::query(
            "UPDATE payment_holds
             SET pre_dispute_status = CASE WHEN status <> 'disputed' THEN status ELSE pre_dispute_status END,
                 status = 'disputed',
                 updated_at = now()
             WHERE job_id = $1",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn update_dispute_status(
        &self,
        id: &DisputeId,
        expected: &[DisputeStatus],
        next: DisputeStatus,
        actor: Option<UserId>,
    ) -> Result<Option<Dispute>, StoreError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            "UPDATE disputes
             SET status = $2,
                 updated_at = now(),
                 reviewed_by = CASE WHEN $2 = 'under_review' THEN COALESCE($3, reviewed_by) ELSE reviewed_by END
             WHERE id = $1 AND status = ANY($4)
             RETURNING {DISPUTE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(next.as_str())
        .bind(actor.map(|u| *u.as_uuid()))
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => row.into_record().map(Some),
            None if self.dispute_exists(id).await? => Ok(None),
            None => Err(missing("dispute", id)),
        }
    }

    async fn record_resolution(&self, id: &DisputeId, record: &ResolutionRecord) -> Result<Dispute, StoreError> {
        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            "UPDATE disputes
             SET status = 'resolved',
                 resolution_text = $2,
                 resolution_action = $3,
                 contractor_amount_minor = $4,
                 homeowner_refund_minor = $5,
                 resolved_by = $6,
                 resolved_at = $7,
                 admin_notes = $8,
                 updated_at = $7
             WHERE id = $1 AND status = 'resolving'
             RETURNING {DISPUTE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(&record.text)
        .bind(record.action.as_str())
        .bind(record.contractor_amount.map(i64::from))
        .bind(record.homeowner_refund.map(i64::from))
        .bind(record.resolved_by.as_uuid())
        .bind(record.resolved_at)
        .bind(record.admin_notes.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => row.into_record(),
            None if self.dispute_exists(id).await? => Err(StoreError::Backend(format!(
                "dispute {id} must be resolving to record a resolution"
            ))),
            None => Err(missing("dispute", id)),
        }
    }

    async fn update_job_status(&self, id: &JobId, status: JobStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE jobs SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(missing("job", id));
        }
        Ok(())
    }

    async fn update_payment_hold_status(
        &self,
        id: &PaymentHoldId,
        status: HoldStatus,
        released_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE payment_holds
             SET status = $2, released_at = COALESCE($3, released_at), updated_at = now()
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(released_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(missing("payment hold", id));
        }
        Ok(())
    }

    async fn insert_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO settlements ({SETTLEMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(op.id.as_uuid())
        .bind(op.dispute_id.as_uuid())
        .bind(op.job_id.as_uuid())
        .bind(op.kind.as_str())
        .bind(op.amount.map(i64::from))
        .bind(&op.currency)
        .bind(&op.target_ref)
        .bind(&op.resolution_tag)
        .bind(&op.idempotency_key)
        .bind(op.status.as_str())
        .bind(op.attempts as i32)
        .bind(op.last_error.as_deref())
        .bind(op.receipt_id.as_deref())
        .bind(op.created_at)
        .bind(op.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE settlements
             SET status = $2, attempts = $3, last_error = $4, receipt_id = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(op.id.as_uuid())
        .bind(op.status.as_str())
        .bind(op.attempts as i32)
        .bind(op.last_error.as_deref())
        .bind(op.receipt_id.as_deref())
        .bind(op.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(missing("settlement", op.id));
        }
        Ok(())
    }

    async fn list_settlements(
        &self,
        status: Option<SettlementStatus>,
        limit: usize,
    ) -> Result<Vec<SettlementOperation>, StoreError> {
        let rows = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY updated_at ASC
             LIMIT $2"
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(SettlementRow::into_record).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

// ── Row types ───────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    title: String,
    status: String,
    requester_id: Uuid,
    provider_id: Option<Uuid>,
    final_cost_minor: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_record(self) -> Result<Job, StoreError> {
        let id = self.id;
        Ok(Job {
            id: JobId::from_uuid(id),
            title: self.title,
            status: self.status.parse().map_err(|e| corrupt("job", id, e))?,
            requester_id: UserId::from_uuid(self.requester_id),
            provider_id: self.provider_id.map(UserId::from_uuid),
            final_cost: self.final_cost_minor.map(|m| amount("job", id, m)).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    id: Uuid,
    job_id: Uuid,
    status: String,
    total_amount_minor: i64,
    platform_fee_minor: i64,
    provider_payout_minor: i64,
    currency: String,
    processor_ref: Option<String>,
    pre_dispute_status: Option<String>,
    released_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl HoldRow {
    fn into_record(self) -> Result<PaymentHold, StoreError> {
        let id = self.id;
        Ok(PaymentHold {
            id: PaymentHoldId::from_uuid(id),
            job_id: JobId::from_uuid(self.job_id),
            status: self.status.parse().map_err(|e| corrupt("payment hold", id, e))?,
            total_amount: amount("payment hold", id, self.total_amount_minor)?,
            platform_fee: amount("payment hold", id, self.platform_fee_minor)?,
            provider_payout: amount("payment hold", id, self.provider_payout_minor)?,
            currency: self.currency,
            processor_ref: self.processor_ref,
            pre_dispute_status: self
                .pre_dispute_status
                .map(|s| s.parse::<HoldStatus>())
                .transpose()
                .map_err(|e| corrupt("payment hold", id, e))?,
            released_at: self.released_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    job_id: Uuid,
    filed_by: Uuid,
    filer_role: String,
    reason: String,
    description: Option<String>,
    status: String,
    reviewed_by: Option<Uuid>,
    resolution_text: Option<String>,
    resolution_action: Option<String>,
    contractor_amount_minor: Option<i64>,
    homeowner_refund_minor: Option<i64>,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DisputeRow {
    fn into_record(self) -> Result<Dispute, StoreError> {
        let id = self.id;
        let resolution = match (self.resolution_action, self.resolved_by, self.resolved_at) {
            (Some(action), Some(resolved_by), Some(resolved_at)) => Some(ResolutionRecord {
                text: self.resolution_text.unwrap_or_default(),
                action: action
                    .parse::<ResolutionKind>()
                    .map_err(|e| corrupt("dispute", id, e))?,
                contractor_amount: self
                    .contractor_amount_minor
                    .map(|m| amount("dispute", id, m))
                    .transpose()?,
                homeowner_refund: self
                    .homeowner_refund_minor
                    .map(|m| amount("dispute", id, m))
                    .transpose()?,
                resolved_by: UserId::from_uuid(resolved_by),
                resolved_at,
                admin_notes: self.admin_notes,
            }),
            _ => None,
        };

        Ok(Dispute {
            id: DisputeId::from_uuid(id),
            job_id: JobId::from_uuid(self.job_id),
            filed_by: UserId::from_uuid(self.filed_by),
            filer_role: self.filer_role.parse().map_err(|e| corrupt("dispute", id, e))?,
            reason: DisputeReason::parse(&self.reason).map_err(|e| corrupt("dispute", id, e))?,
            description: self.description,
            status: self.status.parse().map_err(|e| corrupt("dispute", id, e))?,
            reviewed_by: self.reviewed_by.map(UserId::from_uuid),
            resolution,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettlementRow {
    id: Uuid,
    dispute_id: Uuid,
    job_id: Uuid,
    kind: String,
    amount_minor: Option<i64>,
    currency: String,
    target_ref: String,
    resolution_tag: String,
    idempotency_key: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    receipt_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SettlementRow {
    fn into_record(self) -> Result<SettlementOperation, StoreError> {
        let id = self.id;
        Ok(SettlementOperation {
            id: SettlementId::from_uuid(id),
            dispute_id: DisputeId::from_uuid(self.dispute_id),
            job_id: JobId::from_uuid(self.job_id),
            kind: self.kind.parse().map_err(|e| corrupt("settlement", id, e))?,
            amount: self.amount_minor.map(|m| amount("settlement", id, m)).transpose()?,
            currency: self.currency,
            target_ref: self.target_ref,
            resolution_tag: self.resolution_tag,
            idempotency_key: self.idempotency_key,
            status: self.status.parse().map_err(|e| corrupt("settlement", id, e))?,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            last_error: self.last_error,
            receipt_id: self.receipt_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
