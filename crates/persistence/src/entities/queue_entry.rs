//! Queue entry entity definitions.
//!
//! Maps to the job_queue table. A row is one pending occurrence of a job;
//! there is no "claimed" state because claiming deletes the row.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the job_queue table.
#[derive(Debug, Clone, FromRow)]
pub struct QueueEntryEntity {
    pub id: Uuid,
    pub job_name: String,
    pub not_before: Option<DateTime<Utc>>,
    pub parameters: serde_json::Value,
    /// Reserved column, carried through untouched.
    pub concurrency_key: Option<String>,
    /// Reserved column, carried through untouched.
    pub dedup_key: Option<String>,
    pub created_at: DateTime<Utc>,
}
