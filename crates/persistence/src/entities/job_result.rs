//! Job result entity definitions.
//!
//! Maps to the job_results table: one row per claimed occurrence.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the job_results table.
#[derive(Debug, Clone, FromRow)]
pub struct JobResultEntity {
    /// Same id as the queue entry that produced this result.
    pub id: Uuid,
    pub job_name: String,
    pub executed_at: DateTime<Utc>,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_log: String,
    pub is_error: bool,
}

/// Input for recording an occurrence outcome.
#[derive(Debug, Clone)]
pub struct NewJobResult {
    pub id: Uuid,
    pub job_name: String,
    pub executed_at: DateTime<Utc>,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_log: String,
    pub is_error: bool,
}

impl NewJobResult {
    /// Outcome of a job body that returned normally.
    pub fn success(
        id: Uuid,
        job_name: impl Into<String>,
        executed_at: DateTime<Utc>,
        parameters: serde_json::Value,
        result: serde_json::Value,
    ) -> Self {
        Self {
            id,
            job_name: job_name.into(),
            executed_at,
            parameters,
            result: Some(result),
            error_log: String::new(),
            is_error: false,
        }
    }

    /// Outcome of a job body that failed.
    ///
    /// NUL characters are dropped from `error_log`; TEXT columns reject them.
    pub fn failure(
        id: Uuid,
        job_name: impl Into<String>,
        executed_at: DateTime<Utc>,
        parameters: serde_json::Value,
        error_log: impl Into<String>,
    ) -> Self {
        Self {
            id,
            job_name: job_name.into(),
            executed_at,
            parameters,
            result: None,
            error_log: error_log.into().replace('\0', ""),
            is_error: true,
        }
    }
}
