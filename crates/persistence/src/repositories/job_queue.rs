//! Job queue repository.
//!
//! Provides data access for pending job occurrences: enqueueing, the
//! scheduler's upsert primitives and the worker's atomic claim.

use chrono::{DateTime, Utc};
use domain::models::EnqueueRequest;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::queue_entry::QueueEntryEntity;
use crate::metrics::QueryTimer;

/// Repository for job queue operations.
#[derive(Clone)]
pub struct JobQueueRepository {
    pool: PgPool,
}

impl JobQueueRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one occurrence using the caller's connection.
    pub async fn insert(
        conn: &mut PgConnection,
        job_name: &str,
        not_before: Option<DateTime<Utc>>,
        parameters: &serde_json::Value,
    ) -> Result<QueueEntryEntity, sqlx::Error> {
        let entity = sqlx::query_as::<_, QueueEntryEntity>(
            r#"
            INSERT INTO job_queue (id, job_name, not_before, parameters)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_name, not_before, parameters, concurrency_key, dedup_key, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_name)
        .bind(not_before)
        .bind(parameters)
        .fetch_one(conn)
        .await?;

        Ok(entity)
    }

    /// Enqueue one occurrence in its own statement.
    pub async fn enqueue(&self, request: &EnqueueRequest) -> Result<QueueEntryEntity, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::insert(
            &mut conn,
            &request.job_name,
            request.not_before,
            &request.parameters,
        )
        .await
    }

    /// Serialize writers for one job name until the transaction ends.
    pub async fn lock_job_name(conn: &mut PgConnection, job_name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(job_name)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Lock and return the earliest pending entry for `job_name`.
    ///
    /// Entries without `not_before` sort first.
    pub async fn find_pending_for_update(
        conn: &mut PgConnection,
        job_name: &str,
    ) -> Result<Option<QueueEntryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_pending_for_update");
        let entity = sqlx::query_as::<_, QueueEntryEntity>(
            r#"
            SELECT id, job_name, not_before, parameters, concurrency_key, dedup_key, created_at
            FROM job_queue
            WHERE job_name = $1
            ORDER BY not_before ASC NULLS FIRST, created_at ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(job_name)
        .fetch_optional(conn)
        .await;
        timer.record();

        entity
    }

    /// Move an entry's eligibility time.
    pub async fn reschedule(
        conn: &mut PgConnection,
        id: Uuid,
        not_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET not_before = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(not_before)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Claim one eligible entry by deleting it.
    ///
    /// Picks a random eligible row so that concurrent workers spread out, and
    /// skips rows another transaction already locked. The claim is only
    /// durable once the caller commits.
    pub async fn claim_next(
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("claim_next");
        let entity = sqlx::query_as::<_, QueueEntryEntity>(
            r#"
            DELETE FROM job_queue
            WHERE id = (
                SELECT id FROM job_queue
                WHERE not_before IS NULL OR not_before <= $1
                ORDER BY random()
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, job_name, not_before, parameters, concurrency_key, dedup_key, created_at
            "#,
        )
        .bind(now)
        .fetch_optional(conn)
        .await;
        timer.record();

        entity
    }

    /// Find entry by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueEntryEntity>, sqlx::Error> {
        let entity = sqlx::query_as::<_, QueueEntryEntity>(
            r#"
            SELECT id, job_name, not_before, parameters, concurrency_key, dedup_key, created_at
            FROM job_queue
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity)
    }

    /// List pending entries for a job, earliest first.
    pub async fn find_by_job_name(
        &self,
        job_name: &str,
    ) -> Result<Vec<QueueEntryEntity>, sqlx::Error> {
        let entities = sqlx::query_as::<_, QueueEntryEntity>(
            r#"
            SELECT id, job_name, not_before, parameters, concurrency_key, dedup_key, created_at
            FROM job_queue
            WHERE job_name = $1
            ORDER BY not_before ASC NULLS FIRST, created_at ASC
            "#,
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities)
    }

    /// Count all pending entries.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
