// SPDX-License-Identifier: BUSL-1.1
//! Timeouts and settlement currency for the dispute core.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Upper bound on every store call.
    pub store_timeout: Duration,
    /// Upper bound on every processor call. Expiry counts as a processor
    /// failure.
    pub processor_timeout: Duration,
    /// ISO 4217 code in processor casing, e.g. `usd`.
    pub currency: String,
    /// Longest free-text description accepted on filing.
    pub max_description_len: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5_000),
            processor_timeout: Duration::from_millis(15_000),
            currency: "usd".to_string(),
            max_description_len: 4_000,
        }
    }
}
