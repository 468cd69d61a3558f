// SPDX-License-Identifier: BUSL-1.1
//! # hearth-disputes — Escrow Dispute Core
//!
//! Filing and resolution of disputes over escrowed marketplace payments.
//!
//! ## Components
//!
//! - [`DisputeFilingService`]: opens a dispute on an in-progress job and
//!   freezes the job and its payment hold.
//! - [`ResolutionOrchestrator`]: applies an administrator's decision. It
//!   claims the dispute, moves money through the payment processor, then
//!   commits dispute, job and hold state.
//! - [`allocation::plan`]: pure function from a decision and the hold's
//!   state to the refund/transfer to perform and the target statuses.
//! - [`Reconciler`]: retries settlement operations left `failed` or stuck
//!   `intended`.
//!
//! ## State machines
//!
//! ```text
//! dispute:  open ─▶ under_review ─▶ resolving ─▶ resolved
//!             └──────────────────────▲
//! job:      in_progress ─▶ on_hold ─▶ completed | cancelled | in_progress
//! hold:     authorized|captured ─▶ disputed ─▶ released | refunded
//!                                            | partial_refund | (restored)
//! ```
//!
//! Every store call is bounded by [`CoreConfig::store_timeout`] and every
//! processor call by [`CoreConfig::processor_timeout`].

pub mod allocation;
pub mod config;
pub mod dispute;
pub mod error;
pub mod executor;
pub mod filing;
pub mod gate;
pub mod hold;
pub mod job;
pub mod memory;
mod notices;
pub mod reconcile;
pub mod resolution;
pub mod settlement;
pub mod store;

pub use allocation::{ResolutionAction, SettlementPlan, SkippedOperation};
pub use config::CoreConfig;
pub use dispute::{Dispute, DisputeReason, DisputeStatus, ResolutionKind, ResolutionRecord};
pub use error::{DisputeError, StoreError};
pub use executor::SettlementExecutor;
pub use filing::{DisputeFilingService, FileDispute};
pub use gate::{AuthorizationGate, PartyGate};
pub use hold::{HoldStatus, PaymentHold};
pub use job::{Job, JobStatus, PartyRole};
pub use memory::MemoryStore;
pub use reconcile::{ReconcileReport, Reconciler};
pub use resolution::{ResolutionOrchestrator, ResolutionOutcome, ResolveDispute};
pub use settlement::{SettlementKind, SettlementOperation, SettlementStatus};
pub use store::{DisputeCounts, DisputeFilter, EscrowStore};
