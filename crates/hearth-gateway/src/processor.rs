// SPDX-License-Identifier: BUSL-1.1
//! # Payment Processor Port
//!
//! The [`PaymentProcessor`] trait abstracts the card processor that holds
//! escrowed funds. Production uses [`crate::HttpPaymentProcessor`]; tests and
//! local development use [`MockPaymentProcessor`].
//!
//! Amounts always travel as integer minor units ([`Amount`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{Amount, DisputeId, JobId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;

/// Metadata attached to every processor call so the processor dashboard can
/// be traced back to the dispute that caused the movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMetadata {
    pub job_id: JobId,
    pub dispute_id: DisputeId,
    /// `full_release`, `full_refund`, `partial_refund` or `partial_release`.
    pub resolution: String,
}

/// Pay a contractor's connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: Amount,
    pub currency: String,
    /// Connected account reference of the payee.
    pub destination: String,
    pub idempotency_key: String,
    pub metadata: SettlementMetadata,
}

/// Refund against the original charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Processor reference of the original charge (payment intent).
    pub processor_ref: String,
    /// `None` refunds the full captured amount.
    pub amount: Option<Amount>,
    pub idempotency_key: String,
    pub metadata: SettlementMetadata,
}

/// Processor acknowledgement of a completed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorReceipt {
    pub receipt_id: String,
}

/// Adapter trait for the escrow payment processor.
///
/// Implementations must be `Send + Sync` for use behind `Arc` across async
/// tasks. Requests with the same `idempotency_key` must not move money twice.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Transfer `amount` to a connected account.
    async fn transfer(&self, request: &TransferRequest) -> Result<ProcessorReceipt, ProcessorError>;

    /// Refund all or part of an original charge.
    async fn refund(&self, request: &RefundRequest) -> Result<ProcessorReceipt, ProcessorError>;

    /// Human-readable adapter name for logging.
    fn adapter_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// A call observed by [`MockPaymentProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorCall {
    Transfer(TransferRequest),
    Refund(RefundRequest),
}

/// Deterministic in-process processor.
///
/// Records every call. Conventions:
/// - destinations starting with `acct_reject` are rejected;
/// - `fail_transfers` / `fail_refunds` make the respective call return
///   `ServiceUnavailable`;
/// - `with_latency` delays every call, for exercising caller timeouts.
///
/// Receipt ids are derived from the idempotency key, so replays return the
/// same receipt.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentProcessor {
    inner: Arc<MockInner>,
}

#[derive(Debug, Default)]
struct MockInner {
    calls: Mutex<Vec<ProcessorCall>>,
    fail_transfers: AtomicBool,
    fail_refunds: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.inner.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.inner.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock() = Some(latency);
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.inner.calls.lock().clone()
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProcessorCall::Transfer(t) => Some(t),
                ProcessorCall::Refund(_) => None,
            })
            .collect()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProcessorCall::Refund(r) => Some(r),
                ProcessorCall::Transfer(_) => None,
            })
            .collect()
    }

    async fn simulate_latency(&self) {
        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn transfer(&self, request: &TransferRequest) -> Result<ProcessorReceipt, ProcessorError> {
        self.inner
            .calls
            .lock()
            .push(ProcessorCall::Transfer(request.clone()));
        self.simulate_latency().await;

        if self.inner.fail_transfers.load(Ordering::SeqCst) {
            return Err(ProcessorError::ServiceUnavailable {
                reason: "mock: transfers disabled".into(),
            });
        }
        if request.destination.starts_with("acct_reject") {
            return Err(ProcessorError::Rejected {
                operation: "transfer".into(),
                reason: format!("mock: destination {} rejected", request.destination),
            });
        }
        Ok(ProcessorReceipt {
            receipt_id: format!("tr_mock_{}", request.idempotency_key),
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<ProcessorReceipt, ProcessorError> {
        self.inner
            .calls
            .lock()
            .push(ProcessorCall::Refund(request.clone()));
        self.simulate_latency().await;

        if self.inner.fail_refunds.load(Ordering::SeqCst) {
            return Err(ProcessorError::ServiceUnavailable {
                reason: "mock: refunds disabled".into(),
            });
        }
        Ok(ProcessorReceipt {
            receipt_id: format!("re_mock_{}", request.idempotency_key),
        })
    }

    fn adapter_name(&self) -> &str {
        "mock"
    }
}
