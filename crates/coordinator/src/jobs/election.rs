//! Lease-based leader election.
//!
//! Every instance runs the election loop. Each attempt is one short
//! READ COMMITTED transaction that locks the lease table, so the
//! check-and-set below is serialized across all electors:
//!
//! 1. no lease row: insert one naming this instance
//! 2. lease held by this instance: renew it
//! 3. lease older than `lease_duration`: steal it
//! 4. otherwise: roll back and stay a follower
//!
//! The table lock is released when the transaction ends, whichever way it ends.

use chrono::{DateTime, Utc};
use metrics::gauge;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use persistence::db::begin_read_committed;
use persistence::entities::LeaseEntity;
use persistence::repositories::LeaseRepository;

use super::sleep_or_shutdown;

/// What an election attempt should do with the current lease row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseDecision {
    Acquire,
    Renew,
    Steal { previous: String },
    Yield { holder: String },
}

/// Result of one election attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    Acquired,
    Renewed,
    Stolen { previous: String },
    Follower { holder: String },
}

impl ElectionOutcome {
    pub fn is_leader(&self) -> bool {
        !matches!(self, ElectionOutcome::Follower { .. })
    }
}

/// Decide the check-and-set step for `instance_id` at `now`.
pub fn decide(
    existing: Option<&LeaseEntity>,
    instance_id: &str,
    now: DateTime<Utc>,
    lease_duration: chrono::Duration,
) -> LeaseDecision {
    match existing {
        None => LeaseDecision::Acquire,
        Some(lease) if lease.holder == instance_id => LeaseDecision::Renew,
        Some(lease) if lease.age(now) >= lease_duration => LeaseDecision::Steal {
            previous: lease.holder.clone(),
        },
        Some(lease) => LeaseDecision::Yield {
            holder: lease.holder.clone(),
        },
    }
}

/// Whether `lease` names `instance_id` and is still fresh at `now`.
pub fn holds_fresh_lease(
    lease: Option<&LeaseEntity>,
    instance_id: &str,
    now: DateTime<Utc>,
    lease_duration: chrono::Duration,
) -> bool {
    lease.is_some_and(|l| l.holder == instance_id && l.age(now) < lease_duration)
}

/// Runs election attempts and answers "am I the leader?".
pub struct LeaderElector {
    pool: PgPool,
    repo: LeaseRepository,
    instance_id: String,
    lease_duration: chrono::Duration,
    lock_timeout: Duration,
    was_leader: AtomicBool,
}

impl LeaderElector {
    /// Create an elector for `instance_id`.
    pub fn new(
        pool: PgPool,
        instance_id: impl Into<String>,
        lease_duration: Duration,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            repo: LeaseRepository::new(pool.clone()),
            pool,
            instance_id: instance_id.into(),
            lease_duration: chrono::Duration::from_std(lease_duration)
                .unwrap_or_else(|_| chrono::Duration::days(365_000)),
            lock_timeout,
            was_leader: AtomicBool::new(false),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Run one serialized check-and-set against the lease row.
    pub async fn elect_once(&self) -> Result<ElectionOutcome, sqlx::Error> {
        let mut tx = begin_read_committed(&self.pool, self.lock_timeout).await?;

        LeaseRepository::lock_table(&mut tx).await?;
        let existing = LeaseRepository::find(&mut tx).await?;
        // Read the clock under the lock so a long lock wait cannot age the new renewal
        let now = Utc::now();

        let outcome = match decide(existing.as_ref(), &self.instance_id, now, self.lease_duration)
        {
            LeaseDecision::Acquire => {
                LeaseRepository::insert(&mut tx, &self.instance_id, now).await?;
                tx.commit().await?;
                ElectionOutcome::Acquired
            }
            LeaseDecision::Renew => {
                LeaseRepository::update(&mut tx, &self.instance_id, now).await?;
                tx.commit().await?;
                ElectionOutcome::Renewed
            }
            LeaseDecision::Steal { previous } => {
                LeaseRepository::update(&mut tx, &self.instance_id, now).await?;
                tx.commit().await?;
                ElectionOutcome::Stolen { previous }
            }
            LeaseDecision::Yield { holder } => {
                tx.rollback().await?;
                ElectionOutcome::Follower { holder }
            }
        };

        self.note_outcome(&outcome);
        Ok(outcome)
    }

    fn note_outcome(&self, outcome: &ElectionOutcome) {
        let leader = outcome.is_leader();
        let was_leader = self.was_leader.swap(leader, Ordering::SeqCst);
        gauge!("scheduler_is_leader").set(if leader { 1.0 } else { 0.0 });

        match (was_leader, outcome) {
            (false, ElectionOutcome::Stolen { previous }) => {
                info!(
                    instance = %self.instance_id,
                    previous = %previous,
                    "Took over expired leader lease"
                );
            }
            (false, ElectionOutcome::Acquired | ElectionOutcome::Renewed) => {
                info!(instance = %self.instance_id, "Acquired leader lease");
            }
            (true, ElectionOutcome::Follower { holder }) => {
                warn!(
                    instance = %self.instance_id,
                    holder = %holder,
                    "Lost leader lease"
                );
            }
            _ => {
                debug!(instance = %self.instance_id, outcome = ?outcome, "Election attempt");
            }
        }
    }

    fn step_down(&self) {
        if self.was_leader.swap(false, Ordering::SeqCst) {
            warn!(instance = %self.instance_id, "Stepping down until the next successful election");
        }
        gauge!("scheduler_is_leader").set(0.0);
    }

    /// Lock-free check whether this instance currently holds a fresh lease.
    ///
    /// May race with a concurrent steal; callers only perform idempotent work.
    pub async fn check_leader(&self) -> Result<bool, sqlx::Error> {
        let lease = self.repo.current().await?;
        Ok(holds_fresh_lease(
            lease.as_ref(),
            &self.instance_id,
            Utc::now(),
            self.lease_duration,
        ))
    }

    /// Like [`check_leader`](Self::check_leader), but store errors mean "no".
    pub async fn is_leader(&self) -> bool {
        match self.check_leader().await {
            Ok(leader) => leader,
            Err(e) => {
                warn!(instance = %self.instance_id, error = %e, "Leader check failed");
                false
            }
        }
    }

    /// The lease row as currently stored.
    pub async fn current_lease(&self) -> Result<Option<LeaseEntity>, sqlx::Error> {
        self.repo.current().await
    }

    /// Attempt election every `renewal_interval` until shutdown.
    pub async fn run(&self, renewal_interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            instance = %self.instance_id,
            renewal_interval_secs = renewal_interval.as_secs(),
            lease_duration_secs = self.lease_duration.num_seconds(),
            "Leader election started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if let Err(e) = self.elect_once().await {
                warn!(
                    instance = %self.instance_id,
                    error = %e,
                    "Election attempt failed, not leader this cycle"
                );
                self.step_down();
            }

            if sleep_or_shutdown(renewal_interval, &mut shutdown_rx).await {
                break;
            }
        }

        info!(instance = %self.instance_id, "Leader election shutting down");
    }
}
