// SPDX-License-Identifier: BUSL-1.1
//! # Middleware Stack
//!
//! - [`metrics`]: Prometheus request metrics and the domain counters.
//!
//! Request tracing uses `tower_http::trace::TraceLayer` directly and
//! authentication lives in [`crate::auth`].

pub mod metrics;
