// SPDX-License-Identifier: BUSL-1.1
//! # hearth-api — Binary Entry Point
//!
//! Reads configuration from the environment, picks the store, payment
//! processor and notifier, starts the settlement reconciler and serves the
//! API until Ctrl-C.

use std::sync::Arc;

use hearth_api::db::{self, PgEscrowStore};
use hearth_api::state::{AppConfig, AppState};
use hearth_disputes::{EscrowStore, MemoryStore};
use hearth_gateway::{
    HttpPaymentProcessor, LogNotifier, MockPaymentProcessor, Notifier, NotifierConfig, PaymentProcessor,
    ProcessorConfig, WebhookNotifier,
};
use tokio::sync::watch;

const RECONCILE_BATCH: usize = 50;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        e
    })?;
    let port = config.port;

    let store: Arc<dyn EscrowStore> = match db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })? {
        Some(pool) => Arc::new(PgEscrowStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    let processor: Arc<dyn PaymentProcessor> = match ProcessorConfig::from_env()? {
        Some(processor_config) => {
            tracing::info!("Payment processor configured");
            Arc::new(HttpPaymentProcessor::new(processor_config)?)
        }
        None => {
            tracing::warn!("PAYMENT_PROCESSOR_URL not set, using the mock payment processor. No money will move.");
            Arc::new(MockPaymentProcessor::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match NotifierConfig::from_env()? {
        Some(notifier_config) => Arc::new(WebhookNotifier::new(notifier_config)?),
        None => {
            tracing::info!("NOTIFY_WEBHOOK_URL not set, notices are logged only");
            Arc::new(LogNotifier)
        }
    };

    let reconcile_interval = config.reconcile_interval;
    let state = AppState::assemble(config, store, processor, notifier);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = reconcile_interval.map(|interval| {
        let mut rx = shutdown_rx.clone();
        tracing::info!(interval_secs = interval.as_secs(), "settlement reconciler started");
        state.reconciler.clone().spawn(interval, RECONCILE_BATCH, async move {
            let _ = rx.changed().await;
        })
    });

    let app = hearth_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Hearth API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = reconciler {
        let _ = handle.await;
    }

    Ok(())
}
