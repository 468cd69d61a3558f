// SPDX-License-Identifier: BUSL-1.1
//! # hearth-core — Foundational Types for the Hearth Escrow Stack
//!
//! Every other crate in the workspace depends on this one. It holds the
//! primitives shared by the dispute core, the collaborator clients and the
//! HTTP layer, and nothing that performs I/O.
//!
//! ## Contents
//!
//! - [`identity`]: UUID newtypes ([`JobId`], [`DisputeId`], [`PaymentHoldId`],
//!   [`UserId`], [`SettlementId`]). A job id cannot be passed where a
//!   dispute id is expected.
//! - [`money`]: [`Amount`], an integer count of minor currency units with
//!   exact decimal-string parsing.
//! - [`error`]: [`ValidationError`] raised at construction boundaries.

pub mod error;
pub mod identity;
pub mod money;

pub use error::ValidationError;
pub use identity::{DisputeId, JobId, PaymentHoldId, SettlementId, UserId};
pub use money::Amount;
