//! Leader lease entity.
//!
//! Maps to the scheduler_lease table, which holds at most one row.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Fixed primary key of the singleton lease row.
pub const LEASE_ID: i16 = 1;

/// Database entity for the scheduler_lease table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LeaseEntity {
    pub id: i16,
    pub holder: String,
    pub renewed_at: DateTime<Utc>,
}

impl LeaseEntity {
    /// Age of the lease at `now`. Negative if `renewed_at` lies in the future.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.renewed_at
    }
}
