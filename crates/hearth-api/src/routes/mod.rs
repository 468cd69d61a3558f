// SPDX-License-Identifier: BUSL-1.1
//! # API Route Modules
//!
//! - `disputes`: filing, review, resolution and dispute queries.
//! - `jobs`: read-only job view with its payment hold.
//! - `settlements`: the settlement outbox and manual reconciliation.

pub mod disputes;
pub mod jobs;
pub mod settlements;

use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;

use hearth_disputes::{DisputeError, StoreError};

use crate::error::AppError;
use crate::state::AppState;

/// Parse a path or body identifier, naming the field on failure.
pub(crate) fn parse_id<T>(raw: &str, field: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::Validation(format!("invalid {field}: {e}")))
}

/// Run a direct store read under the configured store deadline.
pub(crate) async fn read<T>(
    state: &AppState,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, AppError> {
    let limit = state.config.core.store_timeout;
    let result = match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    };
    result.map_err(|e| AppError::from(DisputeError::from(e)))
}

/// Clamp a caller-supplied page size.
pub(crate) fn page_size(requested: Option<usize>) -> usize {
    requested.unwrap_or(100).clamp(1, 500)
}
