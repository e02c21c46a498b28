use domain::services::RegistryError;
use thiserror::Error;

/// Postgres SQLSTATE codes that a loop retries immediately.
const TRANSIENT_SQLSTATES: [&str; 3] = [
    "55P03", // lock_not_available (lock_timeout expired)
    "40001", // serialization_failure
    "40P01", // deadlock_detected
];

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoordinatorError {
    /// Whether the failed operation can be retried right away.
    pub fn is_transient(&self) -> bool {
        match self {
            CoordinatorError::Database(err) => is_transient_db_error(err),
            _ => false,
        }
    }
}

/// Lock waits, serialization failures and deadlocks resolve on retry.
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| is_transient_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    TRANSIENT_SQLSTATES.contains(&code)
}
