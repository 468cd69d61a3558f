// SPDX-License-Identifier: BUSL-1.1
//! End-to-end filing and resolution against the in-memory store and the
//! mock payment processor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{Amount, DisputeId, JobId, PaymentHoldId, UserId};
use hearth_disputes::{
    CoreConfig, Dispute, DisputeCounts, DisputeError, DisputeFilingService, DisputeFilter,
    DisputeReason, DisputeStatus, EscrowStore, FileDispute, HoldStatus, Job, JobStatus,
    MemoryStore, PartyGate, PartyRole, PaymentHold, Reconciler, ResolutionAction,
    ResolutionOrchestrator, ResolutionRecord, ResolveDispute, SettlementKind, SettlementOperation,
    SettlementStatus, StoreError,
};
use hearth_gateway::{LogNotifier, MockPaymentProcessor, ProcessorCall};

fn usd(major: i64) -> Amount {
    Amount::from_minor_units(major * 100).unwrap()
}

struct World {
    store: MemoryStore,
    processor: MockPaymentProcessor,
    admin: UserId,
    job: Job,
    hold: PaymentHold,
}

impl World {
    /// In-progress job with a $500 captured hold: $450 payout, $50 fee.
    fn new() -> Self {
        let store = MemoryStore::new();
        let now = Utc::now();
        let provider = UserId::new();
        let job = Job {
            id: JobId::new(),
            title: "Replace water heater".into(),
            status: JobStatus::InProgress,
            requester_id: UserId::new(),
            provider_id: Some(provider),
            final_cost: Some(usd(500)),
            created_at: now,
            updated_at: now,
        };
        let hold = PaymentHold {
            id: PaymentHoldId::new(),
            job_id: job.id,
            status: HoldStatus::Captured,
            total_amount: usd(500),
            platform_fee: usd(50),
            provider_payout: usd(450),
            currency: "usd".into(),
            processor_ref: Some("pi_water_heater".into()),
            pre_dispute_status: None,
            released_at: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_job(job.clone());
        store.insert_hold(hold.clone());
        store.set_payout_destination(provider, "acct_contractor");
        Self {
            store,
            processor: MockPaymentProcessor::new(),
            admin: UserId::new(),
            job,
            hold,
        }
    }

    fn filing(&self) -> DisputeFilingService {
        DisputeFilingService::new(
            Arc::new(self.store.clone()),
            Arc::new(PartyGate::new()),
            Arc::new(LogNotifier),
            CoreConfig::default(),
        )
    }

    fn orchestrator_over(&self, store: Arc<dyn EscrowStore>) -> ResolutionOrchestrator {
        ResolutionOrchestrator::new(
            store,
            Arc::new(self.processor.clone()),
            Arc::new(PartyGate::with_admins([self.admin])),
            Arc::new(LogNotifier),
            CoreConfig::default(),
        )
    }

    fn orchestrator(&self) -> ResolutionOrchestrator {
        self.orchestrator_over(Arc::new(self.store.clone()))
    }

    async fn file(&self) -> Dispute {
        self.filing()
            .file(FileDispute {
                job_id: self.job.id,
                filer_id: self.job.requester_id,
                filer_role: PartyRole::Requester,
                reason: DisputeReason::QualityIssues,
                description: Some("Unit leaks at the inlet".into()),
            })
            .await
            .unwrap()
    }

    fn resolve(&self, dispute: &Dispute, action: ResolutionAction) -> ResolveDispute {
        ResolveDispute {
            dispute_id: dispute.id,
            action,
            resolution: "Decided after reviewing photos".into(),
            admin_notes: None,
            admin_id: self.admin,
            confirm_hold_status: None,
        }
    }
}

#[tokio::test]
async fn release_with_failed_transfer_still_resolves() {
    let world = World::new();
    world.processor.fail_transfers(true);
    let dispute = world.file().await;

    let outcome = world
        .orchestrator()
        .resolve(world.resolve(&dispute, ResolutionAction::ReleaseToContractor))
        .await
        .unwrap();

    assert_eq!(outcome.dispute.status, DisputeStatus::Resolved);
    assert_eq!(outcome.new_job_status, JobStatus::Completed);
    assert_eq!(outcome.new_payment_status, HoldStatus::Released);

    let transfers = world.processor.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, usd(450));
    assert_eq!(transfers[0].destination, "acct_contractor");
    assert_eq!(transfers[0].metadata.resolution, "full_release");

    let ops = world.store.settlements_for_dispute(&dispute.id);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].status, SettlementStatus::Failed);

    assert_eq!(world.store.job(&world.job.id).unwrap().status, JobStatus::Completed);
    let hold = world.store.hold_for_job(&world.job.id).unwrap();
    assert_eq!(hold.status, HoldStatus::Released);
    assert!(hold.released_at.is_some());
}

#[tokio::test]
async fn partial_refund_splits_the_hold() {
    let world = World::new();
    let dispute = world.file().await;

    let outcome = world
        .orchestrator()
        .resolve(world.resolve(
            &dispute,
            ResolutionAction::PartialRefund {
                contractor_amount: usd(200),
                homeowner_refund: usd(250),
            },
        ))
        .await
        .unwrap();

    assert_eq!(outcome.new_job_status, JobStatus::Completed);
    assert_eq!(outcome.new_payment_status, HoldStatus::PartialRefund);

    // Refund goes first.
    let calls = world.processor.calls();
    assert_eq!(calls.len(), 2);
    match &calls[0] {
        ProcessorCall::Refund(r) => {
            assert_eq!(r.amount, Some(usd(250)));
            assert_eq!(r.processor_ref, "pi_water_heater");
        }
        other => panic!("expected refund first, got {other:?}"),
    }
    match &calls[1] {
        ProcessorCall::Transfer(t) => assert_eq!(t.amount, usd(200)),
        other => panic!("expected transfer second, got {other:?}"),
    }

    let resolution = outcome.dispute.resolution.unwrap();
    assert_eq!(resolution.contractor_amount, Some(usd(200)));
    assert_eq!(resolution.homeowner_refund, Some(usd(250)));
    assert!(outcome
        .settlements
        .iter()
        .all(|op| op.status == SettlementStatus::Confirmed));
}

#[tokio::test]
async fn partial_refund_transfer_proceeds_when_refund_fails() {
    let world = World::new();
    world.processor.fail_refunds(true);
    let dispute = world.file().await;

    let outcome = world
        .orchestrator()
        .resolve(world.resolve(
            &dispute,
            ResolutionAction::PartialRefund {
                contractor_amount: usd(200),
                homeowner_refund: usd(250),
            },
        ))
        .await
        .unwrap();

    assert_eq!(outcome.dispute.status, DisputeStatus::Resolved);
    assert_eq!(outcome.new_job_status, JobStatus::Completed);
    assert_eq!(outcome.new_payment_status, HoldStatus::PartialRefund);

    assert_eq!(world.processor.refunds().len(), 1);
    let transfers = world.processor.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, usd(200));

    let statuses: Vec<_> = outcome.settlements.iter().map(|op| (op.kind, op.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (SettlementKind::Refund, SettlementStatus::Failed),
            (SettlementKind::Transfer, SettlementStatus::Confirmed),
        ]
    );

    assert_eq!(world.store.job(&world.job.id).unwrap().status, JobStatus::Completed);
    assert_eq!(
        world.store.hold_for_job(&world.job.id).unwrap().status,
        HoldStatus::PartialRefund
    );
}

#[tokio::test]
async fn full_refund_cancels_the_job() {
    let world = World::new();
    let dispute = world.file().await;

    let outcome = world
        .orchestrator()
        .resolve(world.resolve(&dispute, ResolutionAction::RefundHomeowner))
        .await
        .unwrap();

    assert_eq!(outcome.new_job_status, JobStatus::Cancelled);
    assert_eq!(outcome.new_payment_status, HoldStatus::Refunded);
    let refunds = world.processor.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, None);
    assert_eq!(refunds[0].metadata.resolution, "full_refund");
}

#[tokio::test]
async fn dismissal_restores_the_captured_hold_without_moving_money() {
    let world = World::new();
    let dispute = world.file().await;
    assert_eq!(
        world.store.hold_for_job(&world.job.id).unwrap().status,
        HoldStatus::Disputed
    );

    let outcome = world
        .orchestrator()
        .resolve(world.resolve(&dispute, ResolutionAction::Dismissed))
        .await
        .unwrap();

    assert_eq!(outcome.new_job_status, JobStatus::InProgress);
    assert_eq!(outcome.new_payment_status, HoldStatus::Captured);
    assert!(world.processor.calls().is_empty());
    let hold = world.store.hold_for_job(&world.job.id).unwrap();
    assert_eq!(hold.status, HoldStatus::Captured);
    assert!(hold.released_at.is_none());
}

#[tokio::test]
async fn second_resolution_is_a_conflict_and_moves_nothing() {
    let world = World::new();
    let dispute = world.file().await;
    let orchestrator = world.orchestrator();

    orchestrator
        .resolve(world.resolve(&dispute, ResolutionAction::ReleaseToContractor))
        .await
        .unwrap();
    let calls_after_first = world.processor.calls().len();

    let err = orchestrator
        .resolve(world.resolve(&dispute, ResolutionAction::RefundHomeowner))
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::StateConflict(_)));
    assert_eq!(world.processor.calls().len(), calls_after_first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_have_one_winner() {
    let world = World::new();
    let dispute = world.file().await;
    let orchestrator = Arc::new(world.orchestrator());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        let command = world.resolve(&dispute, ResolutionAction::ReleaseToContractor);
        handles.push(tokio::spawn(async move { orchestrator.resolve(command).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(DisputeError::StateConflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(world.processor.transfers().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_filings_have_one_winner() {
    let world = World::new();
    let filing = Arc::new(world.filing());
    let provider = world.job.provider_id.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let filing = filing.clone();
        let (filer_id, filer_role) = if i % 2 == 0 {
            (world.job.requester_id, PartyRole::Requester)
        } else {
            (provider, PartyRole::Provider)
        };
        let request = FileDispute {
            job_id: world.job.id,
            filer_id,
            filer_role,
            reason: DisputeReason::Other,
            description: None,
        };
        handles.push(tokio::spawn(async move { filing.file(request).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(DisputeError::Validation(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(world.store.disputes_for_job(&world.job.id).len(), 1);
    assert_eq!(world.store.job(&world.job.id).unwrap().status, JobStatus::OnHold);
    assert_eq!(
        world.store.hold_for_job(&world.job.id).unwrap().status,
        HoldStatus::Disputed
    );
}

#[tokio::test]
async fn partial_refund_over_the_held_total_is_rejected_untouched() {
    let world = World::new();
    let dispute = world.file().await;

    let err = world
        .orchestrator()
        .resolve(world.resolve(
            &dispute,
            ResolutionAction::PartialRefund {
                contractor_amount: usd(300),
                homeowner_refund: usd(250),
            },
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::Validation(_)));
    assert!(world.processor.calls().is_empty());

    let stored = world.store.disputes_for_job(&world.job.id);
    assert_eq!(stored[0].status, DisputeStatus::Open);
}

#[tokio::test]
async fn non_admin_cannot_resolve() {
    let world = World::new();
    let dispute = world.file().await;
    let mut command = world.resolve(&dispute, ResolutionAction::Dismissed);
    command.admin_id = world.job.requester_id;

    let err = world.orchestrator().resolve(command).await.unwrap_err();
    assert!(matches!(err, DisputeError::Forbidden(_)));
}

#[tokio::test]
async fn blank_resolution_text_is_rejected() {
    let world = World::new();
    let dispute = world.file().await;
    let mut command = world.resolve(&dispute, ResolutionAction::Dismissed);
    command.resolution = "   ".into();

    let err = world.orchestrator().resolve(command).await.unwrap_err();
    assert!(matches!(err, DisputeError::Validation(_)));
}

#[tokio::test]
async fn unknown_dispute_is_not_found() {
    let world = World::new();
    let phantom = Dispute::open(
        world.job.id,
        world.job.requester_id,
        PartyRole::Requester,
        DisputeReason::Other,
        None,
    );
    let err = world
        .orchestrator()
        .resolve(world.resolve(&phantom, ResolutionAction::Dismissed))
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::NotFound { entity: "dispute", .. }));
}

#[tokio::test]
async fn duplicate_filing_is_rejected() {
    let world = World::new();
    world.file().await;

    // The job is on hold now, so a second filing fails the status check.
    let err = world
        .filing()
        .file(FileDispute {
            job_id: world.job.id,
            filer_id: world.job.provider_id.unwrap(),
            filer_role: PartyRole::Provider,
            reason: DisputeReason::PriceDisagreement,
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::Validation(_)));
    assert_eq!(world.store.disputes_for_job(&world.job.id).len(), 1);
}

#[tokio::test]
async fn filing_on_a_completed_job_changes_nothing() {
    let world = World::new();
    world.store.update_job_status(&world.job.id, JobStatus::Completed).await.unwrap();

    let err = world
        .filing()
        .file(FileDispute {
            job_id: world.job.id,
            filer_id: world.job.requester_id,
            filer_role: PartyRole::Requester,
            reason: DisputeReason::WorkNotCompleted,
            description: None,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DisputeError::Validation("disputes are only allowed on in-progress jobs".into())
    );
    assert!(world.store.disputes_for_job(&world.job.id).is_empty());
    assert_eq!(world.store.job(&world.job.id).unwrap().status, JobStatus::Completed);
    assert_eq!(
        world.store.hold_for_job(&world.job.id).unwrap(),
        world.hold
    );
}

#[tokio::test]
async fn review_claim_then_resolve() {
    let world = World::new();
    let dispute = world.file().await;
    let orchestrator = world.orchestrator();

    let reviewed = orchestrator.claim_for_review(&dispute.id, &world.admin).await.unwrap();
    assert_eq!(reviewed.status, DisputeStatus::UnderReview);
    assert_eq!(reviewed.reviewed_by, Some(world.admin));
    // Idempotent.
    orchestrator.claim_for_review(&dispute.id, &world.admin).await.unwrap();

    let outcome = orchestrator
        .resolve(world.resolve(&dispute, ResolutionAction::RefundHomeowner))
        .await
        .unwrap();
    assert_eq!(outcome.dispute.status, DisputeStatus::Resolved);

    let err = orchestrator
        .claim_for_review(&dispute.id, &world.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::StateConflict(_)));
}

#[tokio::test]
async fn failed_transfer_is_reconciled_with_the_same_key() {
    let world = World::new();
    world.processor.fail_transfers(true);
    let dispute = world.file().await;
    world
        .orchestrator()
        .resolve(world.resolve(&dispute, ResolutionAction::ReleaseToContractor))
        .await
        .unwrap();

    world.processor.fail_transfers(false);
    let reconciler = Reconciler::new(
        Arc::new(world.store.clone()),
        Arc::new(world.processor.clone()),
        CoreConfig::default().store_timeout,
        CoreConfig::default().processor_timeout,
    );
    let report = reconciler.retry_failed(50).await.unwrap();
    assert_eq!(report.confirmed, 1);

    let transfers = world.processor.transfers();
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].idempotency_key, transfers[1].idempotency_key);
    let ops = world.store.settlements_for_dispute(&dispute.id);
    assert_eq!(ops[0].kind, SettlementKind::Transfer);
    assert_eq!(ops[0].status, SettlementStatus::Confirmed);
}

/// Delegates to a [`MemoryStore`] but refuses to record settlements.
struct BrokenOutbox(MemoryStore);

#[async_trait]
impl EscrowStore for BrokenOutbox {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.0.get_job(id).await
    }
    async fn get_payment_hold(&self, job_id: &JobId) -> Result<Option<PaymentHold>, StoreError> {
        self.0.get_payment_hold(job_id).await
    }
    async fn get_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, StoreError> {
        self.0.get_dispute(id).await
    }
    async fn find_active_dispute(&self, job_id: &JobId) -> Result<Option<Dispute>, StoreError> {
        self.0.find_active_dispute(job_id).await
    }
    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError> {
        self.0.list_disputes(filter).await
    }
    async fn count_disputes(&self) -> Result<DisputeCounts, StoreError> {
        self.0.count_disputes().await
    }
    async fn payout_destination(&self, provider: &UserId) -> Result<Option<String>, StoreError> {
        self.0.payout_destination(provider).await
    }
    async fn create_dispute(&self, dispute: &Dispute) -> Result<(), StoreError> {
        self.0.create_dispute(dispute).await
    }
    async fn update_dispute_status(
        &self,
        id: &DisputeId,
        expected: &[DisputeStatus],
        next: DisputeStatus,
        actor: Option<UserId>,
    ) -> Result<Option<Dispute>, StoreError> {
        self.0.update_dispute_status(id, expected, next, actor).await
    }
    async fn record_resolution(&self, id: &DisputeId, record: &ResolutionRecord) -> Result<Dispute, StoreError> {
        self.0.record_resolution(id, record).await
    }
    async fn update_job_status(&self, id: &JobId, status: JobStatus) -> Result<(), StoreError> {
        self.0.update_job_status(id, status).await
    }
    async fn update_payment_hold_status(
        &self,
        id: &PaymentHoldId,
        status: HoldStatus,
        released_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.0.update_payment_hold_status(id, status, released_at).await
    }
    async fn insert_settlement(&self, _op: &SettlementOperation) -> Result<(), StoreError> {
        Err(StoreError::Backend("settlements table unavailable".into()))
    }
    async fn update_settlement(&self, op: &SettlementOperation) -> Result<(), StoreError> {
        self.0.update_settlement(op).await
    }
    async fn list_settlements(
        &self,
        status: Option<SettlementStatus>,
        limit: usize,
    ) -> Result<Vec<SettlementOperation>, StoreError> {
        self.0.list_settlements(status, limit).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        self.0.ping().await
    }
}

#[tokio::test]
async fn persistence_failure_before_any_call_releases_the_claim() {
    let world = World::new();
    let dispute = world.file().await;
    let orchestrator = world.orchestrator_over(Arc::new(BrokenOutbox(world.store.clone())));

    let err = orchestrator
        .resolve(world.resolve(&dispute, ResolutionAction::ReleaseToContractor))
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::Persistence(_)));
    assert!(world.processor.calls().is_empty());

    let stored = world.store.disputes_for_job(&world.job.id);
    assert_eq!(stored[0].status, DisputeStatus::Open);
    assert_eq!(world.store.job(&world.job.id).unwrap().status, JobStatus::OnHold);
}
