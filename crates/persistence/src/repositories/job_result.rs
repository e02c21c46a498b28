//! Job result repository.
//!
//! Provides data access for the result log of executed occurrences.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::job_result::{JobResultEntity, NewJobResult};
use crate::metrics::QueryTimer;

/// Repository for job result operations.
#[derive(Clone)]
pub struct JobResultRepository {
    pool: PgPool,
}

impl JobResultRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one occurrence outcome using the caller's connection.
    pub async fn insert(
        conn: &mut PgConnection,
        result: &NewJobResult,
    ) -> Result<JobResultEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_job_result");
        let entity = sqlx::query_as::<_, JobResultEntity>(
            r#"
            INSERT INTO job_results (id, job_name, executed_at, parameters, result, error_log, is_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, job_name, executed_at, parameters, result, error_log, is_error
            "#,
        )
        .bind(result.id)
        .bind(&result.job_name)
        .bind(result.executed_at)
        .bind(&result.parameters)
        .bind(&result.result)
        .bind(&result.error_log)
        .bind(result.is_error)
        .fetch_one(conn)
        .await;
        timer.record();

        entity
    }

    /// Find result by ID (the originating queue entry's id).
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<JobResultEntity>, sqlx::Error> {
        let entity = sqlx::query_as::<_, JobResultEntity>(
            r#"
            SELECT id, job_name, executed_at, parameters, result, error_log, is_error
            FROM job_results
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity)
    }

    /// Find the most recent results for a job.
    pub async fn find_by_job_name(
        &self,
        job_name: &str,
        limit: i64,
    ) -> Result<Vec<JobResultEntity>, sqlx::Error> {
        let entities = sqlx::query_as::<_, JobResultEntity>(
            r#"
            SELECT id, job_name, executed_at, parameters, result, error_log, is_error
            FROM job_results
            WHERE job_name = $1
            ORDER BY executed_at DESC
            LIMIT $2
            "#,
        )
        .bind(job_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities)
    }

    /// Count all recorded results.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_results")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    /// Delete results executed before `cutoff`, in batches to avoid long locks.
    pub async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64, sqlx::Error> {
        let mut total_deleted: u64 = 0;

        loop {
            let result = sqlx::query(
                r#"
                WITH to_delete AS (
                    SELECT id FROM job_results
                    WHERE executed_at < $1
                    LIMIT $2
                )
                DELETE FROM job_results
                WHERE id IN (SELECT id FROM to_delete)
                "#,
            )
            .bind(cutoff)
            .bind(batch_size)
            .execute(&self.pool)
            .await?;

            let deleted = result.rows_affected();
            total_deleted += deleted;

            if deleted < batch_size as u64 {
                break;
            }

            tokio::task::yield_now().await;
        }

        Ok(total_deleted)
    }
}
