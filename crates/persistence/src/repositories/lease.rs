//! Leader lease repository.
//!
//! The check-and-set primitives take a connection so the election loop can
//! run them inside one transaction that holds the table lock.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::entities::lease::{LeaseEntity, LEASE_ID};
use crate::metrics::QueryTimer;

/// Repository for the singleton leader lease.
#[derive(Clone)]
pub struct LeaseRepository {
    pool: PgPool,
}

impl LeaseRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Serialize electors: blocks concurrent writers until the transaction ends.
    ///
    /// EXCLUSIVE mode still allows plain reads, so `current` stays lock-free.
    pub async fn lock_table(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("LOCK TABLE scheduler_lease IN EXCLUSIVE MODE")
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Read the lease row inside the caller's transaction.
    pub async fn find(conn: &mut PgConnection) -> Result<Option<LeaseEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_lease");
        let entity = sqlx::query_as::<_, LeaseEntity>(
            r#"
            SELECT id, holder, renewed_at
            FROM scheduler_lease
            WHERE id = $1
            "#,
        )
        .bind(LEASE_ID)
        .fetch_optional(conn)
        .await;
        timer.record();

        entity
    }

    /// Create the lease row naming `holder`.
    pub async fn insert(
        conn: &mut PgConnection,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<LeaseEntity, sqlx::Error> {
        let entity = sqlx::query_as::<_, LeaseEntity>(
            r#"
            INSERT INTO scheduler_lease (id, holder, renewed_at)
            VALUES ($1, $2, $3)
            RETURNING id, holder, renewed_at
            "#,
        )
        .bind(LEASE_ID)
        .bind(holder)
        .bind(now)
        .fetch_one(conn)
        .await?;

        Ok(entity)
    }

    /// Overwrite holder and timestamp. Used both to renew and to steal.
    pub async fn update(
        conn: &mut PgConnection,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<LeaseEntity, sqlx::Error> {
        let entity = sqlx::query_as::<_, LeaseEntity>(
            r#"
            UPDATE scheduler_lease
            SET holder = $2,
                renewed_at = $3
            WHERE id = $1
            RETURNING id, holder, renewed_at
            "#,
        )
        .bind(LEASE_ID)
        .bind(holder)
        .bind(now)
        .fetch_one(conn)
        .await?;

        Ok(entity)
    }

    /// Read the lease without taking any lock.
    pub async fn current(&self) -> Result<Option<LeaseEntity>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn).await
    }

    /// Overwrite the lease outside of an election. Used by tooling and tests
    /// to simulate a stale or foreign holder.
    pub async fn force(
        &self,
        holder: &str,
        renewed_at: DateTime<Utc>,
    ) -> Result<LeaseEntity, sqlx::Error> {
        let entity = sqlx::query_as::<_, LeaseEntity>(
            r#"
            INSERT INTO scheduler_lease (id, holder, renewed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET holder = EXCLUDED.holder,
                renewed_at = EXCLUDED.renewed_at
            RETURNING id, holder, renewed_at
            "#,
        )
        .bind(LEASE_ID)
        .bind(holder)
        .bind(renewed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(entity)
    }
}
