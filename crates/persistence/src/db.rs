//! Database connection pool and transaction management.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Creates a PostgreSQL connection pool with the given configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
}

/// Begins a short-lived READ COMMITTED transaction with a bounded lock wait.
///
/// Lock waits longer than `lock_timeout` fail with SQLSTATE `55P03` instead
/// of hanging. Dropping the transaction without committing rolls it back and
/// releases every lock it took.
pub async fn begin_read_committed(
    pool: &PgPool,
    lock_timeout: Duration,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
        .execute(&mut *tx)
        .await?;

    let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", lock_timeout_millis(lock_timeout));
    sqlx::query(&set_timeout).execute(&mut *tx).await?;

    Ok(tx)
}

// Postgres treats a zero lock_timeout as "wait forever".
fn lock_timeout_millis(lock_timeout: Duration) -> u128 {
    lock_timeout.as_millis().max(1)
}
