// SPDX-License-Identifier: BUSL-1.1
//! # Settlement Executor
//!
//! Performs one [`SettlementOperation`] against the payment processor under
//! a deadline and records the outcome on the operation. Never returns an
//! error: processor failures and timeouts become `failed` operations, and an
//! outright refusal (4xx) becomes `abandoned` since resending it cannot help.

use std::sync::Arc;
use std::time::Duration;

use hearth_gateway::{PaymentProcessor, ProcessorError};

use crate::settlement::{SettlementKind, SettlementOperation};

#[derive(Clone)]
pub struct SettlementExecutor {
    processor: Arc<dyn PaymentProcessor>,
    timeout: Duration,
}

impl std::fmt::Debug for SettlementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementExecutor")
            .field("processor", &self.processor.adapter_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SettlementExecutor {
    pub fn new(processor: Arc<dyn PaymentProcessor>, timeout: Duration) -> Self {
        Self { processor, timeout }
    }

    pub async fn execute(&self, op: &mut SettlementOperation) {
        let call = async {
            match op.kind {
                SettlementKind::Transfer => match op.transfer_request() {
                    Some(req) => self.processor.transfer(&req).await,
                    None => Err(ProcessorError::Rejected {
                        operation: "transfer".into(),
                        reason: "transfer has no amount".into(),
                    }),
                },
                SettlementKind::Refund => match op.refund_request() {
                    Some(req) => self.processor.refund(&req).await,
                    None => Err(ProcessorError::Rejected {
                        operation: "refund".into(),
                        reason: "malformed refund".into(),
                    }),
                },
            }
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::Timeout {
                elapsed_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match result {
            Ok(receipt) => {
                tracing::info!(
                    settlement_id = %op.id,
                    dispute_id = %op.dispute_id,
                    kind = %op.kind,
                    receipt_id = %receipt.receipt_id,
                    "settlement confirmed"
                );
                op.mark_confirmed(receipt.receipt_id);
            }
            Err(e @ ProcessorError::Rejected { .. }) => {
                tracing::error!(
                    settlement_id = %op.id,
                    dispute_id = %op.dispute_id,
                    kind = %op.kind,
                    processor = self.processor.adapter_name(),
                    error = %e,
                    "settlement refused by processor; needs manual handling"
                );
                op.mark_failed(e.to_string());
                op.mark_abandoned();
            }
            Err(e) => {
                tracing::error!(
                    settlement_id = %op.id,
                    dispute_id = %op.dispute_id,
                    kind = %op.kind,
                    processor = self.processor.adapter_name(),
                    error = %e,
                    "settlement failed; left for reconciliation"
                );
                op.mark_failed(e.to_string());
            }
        }
    }
}
