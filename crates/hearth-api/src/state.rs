// SPDX-License-Identifier: BUSL-1.1
//! # Application State
//!
//! [`AppConfig`] is read once from the environment. [`AppState`] wires the
//! dispute services over one store, one payment processor and one notifier,
//! and is cloned into every handler.

use std::sync::Arc;
use std::time::Duration;

use hearth_core::UserId;
use hearth_disputes::{
    CoreConfig, DisputeFilingService, EscrowStore, MemoryStore, PartyGate, Reconciler,
    ResolutionOrchestrator,
};
use hearth_gateway::{ConfigError, LogNotifier, MockPaymentProcessor, Notifier, PaymentProcessor};

use crate::auth::SecretToken;
use crate::middleware::metrics::ApiMetrics;

/// | Variable                  | Default |
/// |---------------------------|---------|
/// | `PORT`                    | 8080    |
/// | `AUTH_TOKEN`              | unset (auth disabled) |
/// | `ADMIN_USER_IDS`          | unset (any admin token may resolve) |
/// | `SETTLEMENT_CURRENCY`     | `usd`   |
/// | `STORE_TIMEOUT_MS`        | 5000    |
/// | `PROCESSOR_TIMEOUT_MS`    | 15000   |
/// | `RECONCILE_INTERVAL_SECS` | 300, `0` disables |
/// | `METRICS_ENABLED`         | true    |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub auth_token: Option<SecretToken>,
    pub admin_user_ids: Vec<UserId>,
    pub core: CoreConfig,
    pub reconcile_interval: Option<Duration>,
    pub metrics_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            admin_user_ids: Vec::new(),
            core: CoreConfig::default(),
            reconcile_interval: Some(Duration::from_secs(300)),
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(get("PORT"), "PORT", defaults.port)?;
        let auth_token = lookup("AUTH_TOKEN").filter(|v| !v.is_empty()).map(SecretToken::new);

        let admin_user_ids = match get("ADMIN_USER_IDS") {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<UserId>().map_err(|e| ConfigError::Invalid {
                        var: "ADMIN_USER_IDS",
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?,
        };

        let currency = get("SETTLEMENT_CURRENCY")
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or_else(|| defaults.core.currency.clone());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid {
                var: "SETTLEMENT_CURRENCY",
                reason: format!("'{currency}' is not a three-letter currency code"),
            });
        }

        let store_ms: u64 = parse_or(get("STORE_TIMEOUT_MS"), "STORE_TIMEOUT_MS", 5_000)?;
        let processor_ms: u64 = parse_or(get("PROCESSOR_TIMEOUT_MS"), "PROCESSOR_TIMEOUT_MS", 15_000)?;
        let reconcile_secs: u64 = parse_or(get("RECONCILE_INTERVAL_SECS"), "RECONCILE_INTERVAL_SECS", 300)?;

        let metrics_enabled = get("METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Ok(Self {
            port,
            auth_token,
            admin_user_ids,
            core: CoreConfig {
                store_timeout: Duration::from_millis(store_ms),
                processor_timeout: Duration::from_millis(processor_ms),
                currency,
                ..defaults.core
            },
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            metrics_enabled,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn EscrowStore>,
    pub filing: Arc<DisputeFilingService>,
    pub resolver: Arc<ResolutionOrchestrator>,
    pub reconciler: Arc<Reconciler>,
    pub metrics: ApiMetrics,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// In-memory store, mock processor, log notifier, default config.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MockPaymentProcessor::new()),
            Arc::new(LogNotifier),
        )
    }

    pub fn assemble(
        config: AppConfig,
        store: Arc<dyn EscrowStore>,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let gate = Arc::new(if config.admin_user_ids.is_empty() {
            PartyGate::new()
        } else {
            PartyGate::with_admins(config.admin_user_ids.iter().copied())
        });
        let core = config.core.clone();

        let filing = DisputeFilingService::new(store.clone(), gate.clone(), notifier.clone(), core.clone());
        let resolver = ResolutionOrchestrator::new(
            store.clone(),
            processor.clone(),
            gate,
            notifier,
            core.clone(),
        );
        let reconciler = Reconciler::new(store.clone(), processor, core.store_timeout, core.processor_timeout);

        Self {
            config: Arc::new(config),
            store,
            filing: Arc::new(filing),
            resolver: Arc::new(resolver),
            reconciler: Arc::new(reconciler),
            metrics: ApiMetrics::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
