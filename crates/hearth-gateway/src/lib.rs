// SPDX-License-Identifier: BUSL-1.1
//! # hearth-gateway — Collaborator Clients for the Escrow Core
//!
//! The dispute core never talks to the network directly. It holds trait
//! objects for the two remote collaborators defined here:
//!
//! - [`PaymentProcessor`]: moves money. `transfer` pays a contractor's
//!   connected account, `refund` returns funds against the original charge.
//!   Each call is independent and may fail on its own.
//! - [`Notifier`]: best-effort delivery of dispute notices to job parties.
//!
//! ## Implementations
//!
//! | Trait              | Production                 | Development / tests        |
//! |--------------------|----------------------------|----------------------------|
//! | `PaymentProcessor` | [`HttpPaymentProcessor`]   | [`MockPaymentProcessor`]   |
//! | `Notifier`         | [`WebhookNotifier`]        | [`LogNotifier`]            |
//!
//! All implementations are `Send + Sync` and shared behind `Arc`.
//! Transport failures are retried with exponential backoff (see `retry`);
//! every processor request carries an `Idempotency-Key` so a retry can never
//! move money twice.

pub mod config;
pub mod error;
pub mod http_processor;
pub mod notify;
pub mod processor;
pub(crate) mod retry;

pub use config::{ConfigError, NotifierConfig, ProcessorConfig};
pub use error::{NotifyError, ProcessorError};
pub use http_processor::HttpPaymentProcessor;
pub use notify::{
    DisputeFiledNotice, DisputeResolvedNotice, LogNotifier, Notifier, WebhookNotifier,
};
pub use processor::{
    MockPaymentProcessor, PaymentProcessor, ProcessorCall, ProcessorReceipt, RefundRequest,
    SettlementMetadata, TransferRequest,
};
