// SPDX-License-Identifier: BUSL-1.1
//! # Database Persistence Layer
//!
//! PostgreSQL persistence via SQLx. The database is optional: with
//! `DATABASE_URL` unset the service runs on the in-memory store, which is
//! fine for development and tests but loses all state on restart.

pub mod pg_store;

pub use pg_store::PgEscrowStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set, `Err` if it is set but the
/// connection or a migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store. State will not survive restarts.");
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
