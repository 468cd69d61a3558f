// SPDX-License-Identifier: BUSL-1.1
//! # Settlement Reconciliation
//!
//! Retries settlement operations that the resolution path could not
//! complete: `failed` ones, and `intended` ones older than the stale
//! threshold (the process died between recording and confirming). Retries
//! reuse the original idempotency key, so an operation that did reach the
//! processor the first time is not applied twice.
//!
//! Candidates are taken least recently touched first, so a batch of
//! permanently failing operations cannot starve newer ones. An operation is
//! abandoned once it has used `max_attempts` or the processor refuses it.
//! Only one pass runs at a time per reconciler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hearth_gateway::PaymentProcessor;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::DisputeError;
use crate::executor::SettlementExecutor;
use crate::settlement::{SettlementOperation, SettlementStatus};
use crate::store::{bounded, EscrowStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub confirmed: usize,
    pub still_failed: usize,
    pub abandoned: usize,
}

pub struct Reconciler {
    store: Arc<dyn EscrowStore>,
    executor: SettlementExecutor,
    store_timeout: Duration,
    stale_after: chrono::Duration,
    max_attempts: u32,
    pass: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn EscrowStore>,
        processor: Arc<dyn PaymentProcessor>,
        store_timeout: Duration,
        processor_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor: SettlementExecutor::new(processor, processor_timeout),
            store_timeout,
            stale_after: chrono::Duration::minutes(10),
            max_attempts: 8,
            pass: Mutex::new(()),
        }
    }

    /// Give up on an operation after this many processor attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Treat `intended` operations older than `stale_after` as abandoned.
    pub fn with_stale_after(mut self, stale_after: chrono::Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    async fn candidates(&self, limit: usize) -> Result<Vec<SettlementOperation>, DisputeError> {
        let mut ops = bounded(
            self.store_timeout,
            self.store.list_settlements(Some(SettlementStatus::Failed), limit),
        )
        .await?;

        let cutoff = Utc::now() - self.stale_after;
        let intended = bounded(
            self.store_timeout,
            self.store.list_settlements(Some(SettlementStatus::Intended), limit),
        )
        .await?;
        ops.extend(intended.into_iter().filter(|op| op.updated_at <= cutoff));

        ops.sort_by_key(|op| op.updated_at);
        ops.truncate(limit);
        Ok(ops)
    }

    /// Retry up to `limit` unfinished operations.
    ///
    /// Returns `StateConflict` when another pass is still running.
    pub async fn retry_failed(&self, limit: usize) -> Result<ReconcileReport, DisputeError> {
        let _pass = self
            .pass
            .try_lock()
            .map_err(|_| DisputeError::StateConflict("a reconciliation pass is already running".into()))?;

        let mut report = ReconcileReport::default();
        for mut op in self.candidates(limit).await? {
            report.attempted += 1;
            self.executor.execute(&mut op).await;
            if op.status == SettlementStatus::Failed && op.attempts >= self.max_attempts {
                tracing::error!(
                    settlement_id = %op.id,
                    dispute_id = %op.dispute_id,
                    kind = %op.kind,
                    attempts = op.attempts,
                    last_error = op.last_error.as_deref().unwrap_or_default(),
                    "settlement abandoned after exhausting retries; needs manual handling"
                );
                op.mark_abandoned();
            }
            bounded(self.store_timeout, self.store.update_settlement(&op)).await?;
            match op.status {
                SettlementStatus::Confirmed => report.confirmed += 1,
                SettlementStatus::Abandoned => report.abandoned += 1,
                _ => report.still_failed += 1,
            }
        }
        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                confirmed = report.confirmed,
                still_failed = report.still_failed,
                abandoned = report.abandoned,
                "settlement reconciliation pass complete"
            );
        }
        Ok(report)
    }

    /// Run a pass every `interval` until `shutdown` resolves.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        batch: usize,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => match self.retry_failed(batch).await {
                        Ok(_) => {}
                        Err(DisputeError::StateConflict(_)) => {
                            tracing::debug!("skipping tick; a reconciliation pass is already running");
                        }
                        Err(e) => tracing::error!(error = %e, "settlement reconciliation pass failed"),
                    },
                }
            }
            tracing::debug!("settlement reconciler stopped");
        })
    }
}
