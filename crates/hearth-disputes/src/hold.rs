// SPDX-License-Identifier: BUSL-1.1
//! # Payment Holds
//!
//! The escrow record for one job. Created when the homeowner's payment is
//! authorized; frozen to `disputed` while a dispute is active; settled by
//! the resolution orchestrator.
//!
//! When a hold is frozen its prior status is kept in `pre_dispute_status`
//! so a dismissed dispute can put it back exactly where it was.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use hearth_core::{Amount, JobId, PaymentHoldId};
use serde::{Deserialize, Serialize};

use crate::error::DisputeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Pending,
    Authorized,
    Captured,
    Disputed,
    Released,
    Refunded,
    PartialRefund,
    Failed,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Disputed => "disputed",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::PartialRefund => "partial_refund",
            Self::Failed => "failed",
        }
    }

    /// Funds have left escrow; no further settlement is possible.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::PartialRefund)
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldStatus {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "authorized" => Ok(Self::Authorized),
            "captured" => Ok(Self::Captured),
            "disputed" => Ok(Self::Disputed),
            "released" => Ok(Self::Released),
            "refunded" => Ok(Self::Refunded),
            "partial_refund" => Ok(Self::PartialRefund),
            "failed" => Ok(Self::Failed),
            other => Err(DisputeError::Validation(format!(
                "unknown payment hold status {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHold {
    pub id: PaymentHoldId,
    pub job_id: JobId,
    pub status: HoldStatus,
    pub total_amount: Amount,
    pub platform_fee: Amount,
    pub provider_payout: Amount,
    pub currency: String,
    /// Processor reference of the original charge (payment intent id).
    pub processor_ref: Option<String>,
    /// Status the hold had when it was frozen by a dispute.
    pub pre_dispute_status: Option<HoldStatus>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentHold {
    /// `provider_payout + platform_fee == total_amount`.
    pub fn split_is_balanced(&self) -> bool {
        self.provider_payout.checked_add(self.platform_fee) == Some(self.total_amount)
    }

    /// Freeze for an active dispute, remembering where it came from.
    /// Freezing an already frozen hold keeps the original prior status.
    pub fn freeze(&mut self, now: DateTime<Utc>) {
        if self.status != HoldStatus::Disputed {
            self.pre_dispute_status = Some(self.status);
            self.status = HoldStatus::Disputed;
        }
        self.updated_at = now;
    }

    /// The status a dismissal would restore, if known.
    pub fn restorable_status(&self) -> Option<HoldStatus> {
        match self.status {
            HoldStatus::Disputed => self.pre_dispute_status,
            other => Some(other),
        }
    }

    /// True when the charge was captured before the dispute froze it.
    pub fn funds_captured(&self) -> bool {
        self.restorable_status() == Some(HoldStatus::Captured)
    }
}
