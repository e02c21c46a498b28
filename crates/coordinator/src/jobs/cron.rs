//! Cron scheduler: keeps every periodic job queued while this instance leads.
//!
//! The scheduler never runs jobs. Each cycle it computes the next fire
//! instant of every periodic registration and makes sure the queue holds a
//! matching entry. Upserts are idempotent, so a missed or duplicated cycle
//! (for example right after a leadership change) converges on the next one.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use metrics::counter;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use domain::models::JobRegistration;
use domain::services::JobRegistry;
use persistence::db::begin_read_committed;
use persistence::entities::QueueEntryEntity;
use persistence::repositories::JobQueueRepository;

use super::election::LeaderElector;
use super::sleep_or_shutdown;

/// What one upsert does to the queue for a periodic job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPlan {
    Insert {
        at: DateTime<Utc>,
    },
    Reschedule {
        id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    Keep,
}

/// Decide how to reconcile the pending entry (if any) with `next`.
///
/// An existing entry is only moved when it is still more than
/// `safety_margin` away and disagrees with the computed instant.
pub fn plan(
    existing: Option<&QueueEntryEntity>,
    next: DateTime<Utc>,
    now: DateTime<Utc>,
    safety_margin: chrono::Duration,
) -> UpsertPlan {
    let Some(entry) = existing else {
        return UpsertPlan::Insert { at: next };
    };

    match entry.not_before {
        Some(current) if current - now > safety_margin && current != next => {
            UpsertPlan::Reschedule {
                id: entry.id,
                from: current,
                to: next,
            }
        }
        _ => UpsertPlan::Keep,
    }
}

/// Per-cycle summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub inserted: usize,
    pub rescheduled: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Computes next fire times and upserts queue entries.
pub struct CronScheduler {
    pool: PgPool,
    registry: JobRegistry,
    elector: Arc<LeaderElector>,
    time_zone: Tz,
    safety_margin: chrono::Duration,
    lock_timeout: Duration,
}

impl CronScheduler {
    pub fn new(
        pool: PgPool,
        registry: JobRegistry,
        elector: Arc<LeaderElector>,
        time_zone: Tz,
        safety_margin: Duration,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            registry,
            elector,
            time_zone,
            safety_margin: chrono::Duration::from_std(safety_margin)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            lock_timeout,
        }
    }

    /// Reconcile the queue for every periodic job, regardless of leadership.
    pub async fn run_once(&self, now: DateTime<Utc>) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        for registration in self.registry.periodic() {
            match self.upsert(&registration, now).await {
                Ok(UpsertPlan::Insert { at }) => {
                    debug!(job = %registration.name, not_before = %at, "Queued periodic job");
                    report.inserted += 1;
                }
                Ok(UpsertPlan::Reschedule { from, to, .. }) => {
                    info!(
                        job = %registration.name,
                        from = %from,
                        to = %to,
                        "Rescheduled periodic job"
                    );
                    report.rescheduled += 1;
                }
                Ok(UpsertPlan::Keep) => report.unchanged += 1,
                Err(e) => {
                    warn!(job = %registration.name, error = %e, "Failed to schedule periodic job");
                    report.failed += 1;
                }
            }
        }

        counter!("scheduler_entries_inserted_total").increment(report.inserted as u64);
        counter!("scheduler_entries_rescheduled_total").increment(report.rescheduled as u64);
        counter!("scheduler_upsert_failures_total").increment(report.failed as u64);

        report
    }

    /// Run one cycle if this instance currently leads.
    pub async fn tick(&self) -> Option<ScheduleReport> {
        if !self.elector.is_leader().await {
            return None;
        }

        let report = self.run_once(Utc::now()).await;
        debug!(
            inserted = report.inserted,
            rescheduled = report.rescheduled,
            unchanged = report.unchanged,
            failed = report.failed,
            "Schedule cycle complete"
        );
        Some(report)
    }

    async fn upsert(
        &self,
        registration: &JobRegistration,
        now: DateTime<Utc>,
    ) -> Result<UpsertPlan, sqlx::Error> {
        let Some(schedule) = registration.schedule.as_ref() else {
            return Ok(UpsertPlan::Keep);
        };

        let Some(next) = schedule.next_after(now, self.time_zone) else {
            warn!(
                job = %registration.name,
                schedule = %schedule,
                "Schedule has no upcoming fire time"
            );
            return Ok(UpsertPlan::Keep);
        };

        let mut tx = begin_read_committed(&self.pool, self.lock_timeout).await?;

        // Serializes upserts for this job name across instances, so two
        // overlapping leaders cannot both insert.
        JobQueueRepository::lock_job_name(&mut tx, &registration.name).await?;
        let existing =
            JobQueueRepository::find_pending_for_update(&mut tx, &registration.name).await?;

        let plan = plan(existing.as_ref(), next, now, self.safety_margin);
        match &plan {
            UpsertPlan::Insert { at } => {
                JobQueueRepository::insert(&mut tx, &registration.name, Some(*at), &json!({}))
                    .await?;
            }
            UpsertPlan::Reschedule { id, to, .. } => {
                JobQueueRepository::reschedule(&mut tx, *id, *to).await?;
            }
            UpsertPlan::Keep => {}
        }

        tx.commit().await?;
        Ok(plan)
    }

    /// Run a cycle every `interval` until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            time_zone = %self.time_zone,
            "Cron scheduler started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.tick().await;

            if sleep_or_shutdown(interval, &mut shutdown_rx).await {
                break;
            }
        }

        info!("Cron scheduler shutting down");
    }
}
