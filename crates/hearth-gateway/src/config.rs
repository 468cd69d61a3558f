// SPDX-License-Identifier: BUSL-1.1
//! # Collaborator Configuration
//!
//! Loaded from environment variables at startup. Absent base URLs mean the
//! collaborator is not configured and the binary falls back to the
//! in-process implementation.
//!
//! | Variable                          | Default |
//! |-----------------------------------|---------|
//! | `PAYMENT_PROCESSOR_URL`           | unset   |
//! | `PAYMENT_PROCESSOR_API_KEY`       | unset   |
//! | `PAYMENT_PROCESSOR_TIMEOUT_SECS`  | 30      |
//! | `NOTIFY_WEBHOOK_URL`              | unset   |
//! | `NOTIFY_WEBHOOK_TIMEOUT_SECS`     | 10      |

use zeroize::Zeroizing;

/// Configuration errors are fatal at startup.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{var} is required when {because} is set")]
    Missing {
        var: &'static str,
        because: &'static str,
    },
}

/// Payment processor connection settings.
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Base URL, e.g. `https://api.stripe.com`.
    pub base_url: String,
    /// Secret key sent as a bearer token. Zeroed on drop.
    pub api_key: Zeroizing<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProcessorConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: Zeroizing::new(api_key.into()),
            timeout_secs: 30,
        }
    }

    /// Read from the process environment.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Read through an arbitrary variable lookup. `Ok(None)` when the
    /// processor URL is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = lookup("PAYMENT_PROCESSOR_URL").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        validate_url("PAYMENT_PROCESSOR_URL", &base_url)?;

        let api_key = lookup("PAYMENT_PROCESSOR_API_KEY")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing {
                var: "PAYMENT_PROCESSOR_API_KEY",
                because: "PAYMENT_PROCESSOR_URL",
            })?;

        let timeout_secs = parse_secs(&lookup, "PAYMENT_PROCESSOR_TIMEOUT_SECS", 30)?;

        Ok(Some(Self {
            base_url,
            api_key: Zeroizing::new(api_key),
            timeout_secs,
        }))
    }
}

/// Notification relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub webhook_url: String,
    pub timeout_secs: u64,
}

impl NotifierConfig {
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(webhook_url) = lookup("NOTIFY_WEBHOOK_URL").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        validate_url("NOTIFY_WEBHOOK_URL", &webhook_url)?;
        let timeout_secs = parse_secs(&lookup, "NOTIFY_WEBHOOK_TIMEOUT_SECS", 10)?;
        Ok(Some(Self {
            webhook_url,
            timeout_secs,
        }))
    }
}

fn validate_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
