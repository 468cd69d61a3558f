// SPDX-License-Identifier: BUSL-1.1
//! # Allocation Calculator
//!
//! Turns an administrative [`ResolutionAction`] and the job's payment hold
//! into a [`SettlementPlan`]: at most one transfer, at most one refund, and
//! the statuses the job and hold end in. Pure: no I/O, no clock.
//!
//! | Action                | Processor calls                     | Hold            | Job         |
//! |-----------------------|-------------------------------------|-----------------|-------------|
//! | `ReleaseToContractor` | transfer payout (if captured)       | `released`      | `completed` |
//! | `RefundHomeowner`     | full refund                         | `refunded`      | `cancelled` |
//! | `PartialRefund`       | refund + transfer, each if > 0      | `partial_refund`| `completed` |
//! | `Dismissed`           | none                                | pre-dispute     | `in_progress` |
//!
//! Calls whose preconditions are missing (no charge reference, no payout
//! destination, funds never captured) are returned as skipped rather than
//! failing the plan.

use hearth_core::Amount;
use serde::{Deserialize, Serialize};

use crate::dispute::ResolutionKind;
use crate::error::DisputeError;
use crate::hold::{HoldStatus, PaymentHold};
use crate::job::JobStatus;
use crate::settlement::SettlementKind;

/// The administrative decision. Only `PartialRefund` carries amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    ReleaseToContractor,
    RefundHomeowner,
    PartialRefund {
        contractor_amount: Amount,
        homeowner_refund: Amount,
    },
    Dismissed,
}

impl ResolutionAction {
    /// Build from a wire tag and optional amounts. Amounts are ignored for
    /// every action but `PartialRefund`, which requires both.
    pub fn from_parts(
        kind: ResolutionKind,
        contractor_amount: Option<Amount>,
        homeowner_refund: Option<Amount>,
    ) -> Result<Self, DisputeError> {
        match kind {
            ResolutionKind::ReleaseToContractor => Ok(Self::ReleaseToContractor),
            ResolutionKind::RefundHomeowner => Ok(Self::RefundHomeowner),
            ResolutionKind::Dismissed => Ok(Self::Dismissed),
            ResolutionKind::PartialRefund => match (contractor_amount, homeowner_refund) {
                (Some(contractor_amount), Some(homeowner_refund)) => Ok(Self::PartialRefund {
                    contractor_amount,
                    homeowner_refund,
                }),
                _ => Err(DisputeError::Validation(
                    "partial_refund requires both contractorAmount and homeownerRefund".into(),
                )),
            },
        }
    }

    pub fn kind(&self) -> ResolutionKind {
        match self {
            Self::ReleaseToContractor => ResolutionKind::ReleaseToContractor,
            Self::RefundHomeowner => ResolutionKind::RefundHomeowner,
            Self::PartialRefund { .. } => ResolutionKind::PartialRefund,
            Self::Dismissed => ResolutionKind::Dismissed,
        }
    }

    /// `(contractor_amount, homeowner_refund)` for split resolutions.
    pub fn split(&self) -> (Option<Amount>, Option<Amount>) {
        match self {
            Self::PartialRefund {
                contractor_amount,
                homeowner_refund,
            } => (Some(*contractor_amount), Some(*homeowner_refund)),
            _ => (None, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub amount: Amount,
    pub destination: String,
    pub resolution_tag: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRefund {
    pub processor_ref: String,
    /// `None` refunds the whole charge.
    pub amount: Option<Amount>,
    pub resolution_tag: &'static str,
}

/// A processor call the action called for but could not be made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOperation {
    pub kind: SettlementKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub refund: Option<PlannedRefund>,
    pub transfer: Option<PlannedTransfer>,
    pub skipped: Vec<SkippedOperation>,
    pub target_job_status: JobStatus,
    pub target_hold_status: HoldStatus,
}

impl SettlementPlan {
    pub fn moves_money(&self) -> bool {
        self.refund.is_some() || self.transfer.is_some()
    }
}

/// Everything the calculator needs besides the action.
#[derive(Debug, Clone, Copy)]
pub struct AllocationInput<'a> {
    pub hold: Option<&'a PaymentHold>,
    /// The contractor's connected payout account, if onboarded.
    pub payout_destination: Option<&'a str>,
    /// Admin-confirmed status to restore on dismissal when the hold's
    /// pre-dispute status was never recorded.
    pub confirmed_hold_status: Option<HoldStatus>,
}

pub fn plan(action: &ResolutionAction, input: AllocationInput<'_>) -> Result<SettlementPlan, DisputeError> {
    let mut plan = SettlementPlan {
        refund: None,
        transfer: None,
        skipped: Vec::new(),
        target_job_status: JobStatus::Completed,
        target_hold_status: HoldStatus::Released,
    };

    match *action {
        ResolutionAction::ReleaseToContractor => {
            if let Some(hold) = input.hold {
                if !hold.funds_captured() {
                    plan.skip(SettlementKind::Transfer, "payment was never captured");
                } else if hold.provider_payout.is_zero() {
                    plan.skip(SettlementKind::Transfer, "provider payout is zero");
                } else {
                    plan.transfer_to(input.payout_destination, hold.provider_payout, "full_release");
                }
            }
        }
        ResolutionAction::RefundHomeowner => {
            plan.target_job_status = JobStatus::Cancelled;
            plan.target_hold_status = HoldStatus::Refunded;
            if let Some(hold) = input.hold {
                plan.refund_against(hold, None, "full_refund");
            }
        }
        ResolutionAction::PartialRefund {
            contractor_amount,
            homeowner_refund,
        } => {
            plan.target_hold_status = HoldStatus::PartialRefund;
            if let Some(hold) = input.hold {
                let allocated = contractor_amount.checked_add(homeowner_refund).ok_or_else(|| {
                    DisputeError::Validation("allocated amounts overflow".into())
                })?;
                if allocated > hold.total_amount {
                    return Err(DisputeError::Validation(format!(
                        "contractorAmount + homeownerRefund ({allocated}) exceeds the held total ({})",
                        hold.total_amount
                    )));
                }
                if !homeowner_refund.is_zero() {
                    plan.refund_against(hold, Some(homeowner_refund), "partial_refund");
                }
                if !contractor_amount.is_zero() {
                    plan.transfer_to(input.payout_destination, contractor_amount, "partial_release");
                }
            }
        }
        ResolutionAction::Dismissed => {
            plan.target_job_status = JobStatus::InProgress;
            plan.target_hold_status = match input.hold {
                None => HoldStatus::Pending,
                Some(hold) => hold
                    .restorable_status()
                    .or(input.confirmed_hold_status)
                    .ok_or_else(|| {
                        DisputeError::Validation(
                            "the hold's pre-dispute status is unknown; confirmHoldStatus is required to dismiss"
                                .into(),
                        )
                    })?,
            };
            if plan.target_hold_status == HoldStatus::Disputed {
                return Err(DisputeError::Validation(
                    "a dismissed dispute cannot leave the hold disputed".into(),
                ));
            }
        }
    }

    Ok(plan)
}

impl SettlementPlan {
    fn skip(&mut self, kind: SettlementKind, reason: &str) {
        self.skipped.push(SkippedOperation {
            kind,
            reason: reason.to_string(),
        });
    }

    fn transfer_to(&mut self, destination: Option<&str>, amount: Amount, tag: &'static str) {
        match destination.filter(|d| !d.is_empty()) {
            Some(destination) => {
                self.transfer = Some(PlannedTransfer {
                    amount,
                    destination: destination.to_string(),
                    resolution_tag: tag,
                })
            }
            None => self.skip(SettlementKind::Transfer, "contractor has no payout destination"),
        }
    }

    fn refund_against(&mut self, hold: &PaymentHold, amount: Option<Amount>, tag: &'static str) {
        match hold.processor_ref.as_deref().filter(|r| !r.is_empty()) {
            Some(processor_ref) => {
                self.refund = Some(PlannedRefund {
                    processor_ref: processor_ref.to_string(),
                    amount,
                    resolution_tag: tag,
                })
            }
            None => self.skip(SettlementKind::Refund, "payment hold has no processor reference"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hearth_core::{JobId, PaymentHoldId};
    use proptest::prelude::*;

    fn usd(major: i64) -> Amount {
        Amount::from_minor_units(major * 100).unwrap()
    }

    /// $500 captured: $450 payout, $50 fee, frozen by a dispute.
    fn frozen_hold() -> PaymentHold {
        let now = Utc::now();
        PaymentHold {
            id: PaymentHoldId::new(),
            job_id: JobId::new(),
            status: HoldStatus::Disputed,
            total_amount: usd(500),
            platform_fee: usd(50),
            provider_payout: usd(450),
            currency: "usd".into(),
            processor_ref: Some("pi_abc".into()),
            pre_dispute_status: Some(HoldStatus::Captured),
            released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn input(hold: &PaymentHold) -> AllocationInput<'_> {
        AllocationInput {
            hold: Some(hold),
            payout_destination: Some("acct_pro"),
            confirmed_hold_status: None,
        }
    }

    #[test]
    fn release_transfers_provider_payout() {
        let hold = frozen_hold();
        let plan = plan(&ResolutionAction::ReleaseToContractor, input(&hold)).unwrap();
        let transfer = plan.transfer.unwrap();
        assert_eq!(transfer.amount, usd(450));
        assert_eq!(transfer.destination, "acct_pro");
        assert_eq!(transfer.resolution_tag, "full_release");
        assert!(plan.refund.is_none());
        assert_eq!(plan.target_hold_status, HoldStatus::Released);
        assert_eq!(plan.target_job_status, JobStatus::Completed);
    }

    #[test]
    fn release_skips_uncaptured_or_unpayable() {
        let mut hold = frozen_hold();
        hold.pre_dispute_status = Some(HoldStatus::Authorized);
        let p = plan(&ResolutionAction::ReleaseToContractor, input(&hold)).unwrap();
        assert!(!p.moves_money());
        assert_eq!(p.skipped[0].kind, SettlementKind::Transfer);
        assert_eq!(p.target_hold_status, HoldStatus::Released);

        let hold = frozen_hold();
        let p = plan(
            &ResolutionAction::ReleaseToContractor,
            AllocationInput {
                payout_destination: None,
                ..input(&hold)
            },
        )
        .unwrap();
        assert!(p.transfer.is_none());
        assert_eq!(p.skipped.len(), 1);
    }

    #[test]
    fn refund_is_full_and_cancels_job() {
        let hold = frozen_hold();
        let p = plan(&ResolutionAction::RefundHomeowner, input(&hold)).unwrap();
        let refund = p.refund.unwrap();
        assert_eq!(refund.processor_ref, "pi_abc");
        assert_eq!(refund.amount, None);
        assert_eq!(p.target_hold_status, HoldStatus::Refunded);
        assert_eq!(p.target_job_status, JobStatus::Cancelled);
    }

    #[test]
    fn refund_without_reference_is_skipped() {
        let mut hold = frozen_hold();
        hold.processor_ref = None;
        let p = plan(&ResolutionAction::RefundHomeowner, input(&hold)).unwrap();
        assert!(p.refund.is_none());
        assert_eq!(p.skipped[0].kind, SettlementKind::Refund);
        assert_eq!(p.target_hold_status, HoldStatus::Refunded);
    }

    #[test]
    fn partial_refund_issues_both_operations() {
        let hold = frozen_hold();
        let action = ResolutionAction::PartialRefund {
            contractor_amount: usd(200),
            homeowner_refund: usd(250),
        };
        let p = plan(&action, input(&hold)).unwrap();
        assert_eq!(p.refund.as_ref().unwrap().amount, Some(usd(250)));
        assert_eq!(p.refund.as_ref().unwrap().resolution_tag, "partial_refund");
        assert_eq!(p.transfer.as_ref().unwrap().amount, usd(200));
        assert_eq!(p.transfer.as_ref().unwrap().resolution_tag, "partial_release");
        assert_eq!(p.target_hold_status, HoldStatus::PartialRefund);
        assert_eq!(p.target_job_status, JobStatus::Completed);
    }

    #[test]
    fn partial_refund_zero_side_is_not_called() {
        let hold = frozen_hold();
        let action = ResolutionAction::PartialRefund {
            contractor_amount: Amount::ZERO,
            homeowner_refund: usd(100),
        };
        let p = plan(&action, input(&hold)).unwrap();
        assert!(p.transfer.is_none());
        assert!(p.skipped.is_empty());
        assert!(p.refund.is_some());
    }

    #[test]
    fn partial_refund_rejects_over_allocation() {
        let hold = frozen_hold();
        let action = ResolutionAction::PartialRefund {
            contractor_amount: usd(300),
            homeowner_refund: usd(250),
        };
        let err = plan(&action, input(&hold)).unwrap_err();
        assert!(matches!(err, DisputeError::Validation(msg) if msg.contains("exceeds")));
    }

    #[test]
    fn partial_refund_without_hold_moves_nothing() {
        let action = ResolutionAction::PartialRefund {
            contractor_amount: usd(300),
            homeowner_refund: usd(250),
        };
        let p = plan(
            &action,
            AllocationInput {
                hold: None,
                payout_destination: Some("acct_pro"),
                confirmed_hold_status: None,
            },
        )
        .unwrap();
        assert!(!p.moves_money());
        assert_eq!(p.target_hold_status, HoldStatus::PartialRefund);
    }

    #[test]
    fn dismissal_restores_pre_dispute_status() {
        let hold = frozen_hold();
        let p = plan(&ResolutionAction::Dismissed, input(&hold)).unwrap();
        assert!(!p.moves_money());
        assert_eq!(p.target_hold_status, HoldStatus::Captured);
        assert_eq!(p.target_job_status, JobStatus::InProgress);
    }

    #[test]
    fn dismissal_with_unknown_prior_status_needs_confirmation() {
        let mut hold = frozen_hold();
        hold.pre_dispute_status = None;
        let err = plan(&ResolutionAction::Dismissed, input(&hold)).unwrap_err();
        assert!(matches!(err, DisputeError::Validation(_)));

        let p = plan(
            &ResolutionAction::Dismissed,
            AllocationInput {
                confirmed_hold_status: Some(HoldStatus::Authorized),
                ..input(&hold)
            },
        )
        .unwrap();
        assert_eq!(p.target_hold_status, HoldStatus::Authorized);

        let err = plan(
            &ResolutionAction::Dismissed,
            AllocationInput {
                confirmed_hold_status: Some(HoldStatus::Disputed),
                ..input(&hold)
            },
        )
        .unwrap_err();
        assert!(matches!(err, DisputeError::Validation(_)));
    }

    #[test]
    fn dismissal_without_hold_reports_pending() {
        let p = plan(
            &ResolutionAction::Dismissed,
            AllocationInput {
                hold: None,
                payout_destination: None,
                confirmed_hold_status: None,
            },
        )
        .unwrap();
        assert_eq!(p.target_hold_status, HoldStatus::Pending);
    }

    #[test]
    fn from_parts_requires_both_amounts_for_partial() {
        assert!(ResolutionAction::from_parts(ResolutionKind::PartialRefund, Some(usd(1)), None).is_err());
        assert!(ResolutionAction::from_parts(ResolutionKind::PartialRefund, None, Some(usd(1))).is_err());
        let a = ResolutionAction::from_parts(ResolutionKind::ReleaseToContractor, Some(usd(1)), None).unwrap();
        assert_eq!(a, ResolutionAction::ReleaseToContractor);
        assert_eq!(a.split(), (None, None));
    }

    proptest! {
        #[test]
        fn accepted_partial_plans_never_exceed_total(c in 0i64..60_000, r in 0i64..60_000) {
            let hold = frozen_hold();
            let action = ResolutionAction::PartialRefund {
                contractor_amount: Amount::from_minor_units(c).unwrap(),
                homeowner_refund: Amount::from_minor_units(r).unwrap(),
            };
            match plan(&action, input(&hold)) {
                Ok(p) => {
                    let moved = p.refund.and_then(|x| x.amount).map(|a| a.minor_units()).unwrap_or(0)
                        + p.transfer.map(|x| x.amount.minor_units()).unwrap_or(0);
                    prop_assert!(moved <= hold.total_amount.minor_units());
                }
                Err(_) => prop_assert!(c + r > hold.total_amount.minor_units()),
            }
        }
    }
}
