//! Queue worker.
//!
//! Runs on every instance regardless of leadership. One iteration:
//!
//! 1. claim: delete one random eligible entry and commit, before running it
//! 2. resolve the job name in the registry (unknown names are logged and dropped)
//! 3. run the body in its own task with a context built from its capabilities
//! 4. record exactly one result row, success or failure; a success value the
//!    store rejects is recorded as a failure instead
//!
//! A crash between 1 and 4 loses the occurrence; nothing is redelivered.

use chrono::Utc;
use metrics::{counter, histogram};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::models::JobRegistration;
use domain::services::{JobContext, JobRegistry};
use persistence::db::begin_read_committed;
use persistence::entities::{NewJobResult, QueueEntryEntity};
use persistence::repositories::{JobQueueRepository, JobResultRepository};

use super::sleep_or_shutdown;
use crate::error::{is_transient_db_error, CoordinatorError};

/// Attempts at writing a result row when the store reports a transient error.
const MAX_RECORD_ATTEMPTS: u32 = 3;

/// What happened to a claimed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Succeeded { id: Uuid, job_name: String },
    Failed { id: Uuid, job_name: String },
    /// The job name had no registration; the entry was dropped.
    Discarded { id: Uuid, job_name: String },
}

impl WorkOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            WorkOutcome::Succeeded { id, .. }
            | WorkOutcome::Failed { id, .. }
            | WorkOutcome::Discarded { id, .. } => *id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            WorkOutcome::Succeeded { .. } => "succeeded",
            WorkOutcome::Failed { .. } => "failed",
            WorkOutcome::Discarded { .. } => "discarded",
        }
    }
}

/// Claims and executes queued jobs.
pub struct Worker {
    pool: PgPool,
    registry: JobRegistry,
    lock_timeout: Duration,
}

impl Worker {
    pub fn new(pool: PgPool, registry: JobRegistry, lock_timeout: Duration) -> Self {
        Self {
            pool,
            registry,
            lock_timeout,
        }
    }

    /// Process at most one eligible entry.
    ///
    /// Returns `Ok(None)` when nothing was eligible.
    pub async fn run_once(&self) -> Result<Option<WorkOutcome>, CoordinatorError> {
        let Some(entry) = self.claim().await? else {
            return Ok(None);
        };

        let Some(registration) = self.registry.get(&entry.job_name) else {
            error!(
                job = %entry.job_name,
                id = %entry.id,
                "Claimed entry for unregistered job, discarding"
            );
            let outcome = WorkOutcome::Discarded {
                id: entry.id,
                job_name: entry.job_name,
            };
            counter!("worker_jobs_total", "job" => "unregistered", "outcome" => outcome.label())
                .increment(1);
            return Ok(Some(outcome));
        };

        let mut result = self.execute(&registration, &entry).await;
        if let Err(e) = self.record(&result).await {
            // A value the store rejects still leaves a failure row behind
            if result.is_error || is_transient_db_error(&e) {
                return Err(e.into());
            }
            result = NewJobResult::failure(
                result.id,
                result.job_name,
                result.executed_at,
                result.parameters,
                format!("Failed to store job result: {}", e),
            );
            self.record(&result).await?;
        }

        let outcome = if result.is_error {
            WorkOutcome::Failed {
                id: entry.id,
                job_name: entry.job_name.clone(),
            }
        } else {
            WorkOutcome::Succeeded {
                id: entry.id,
                job_name: entry.job_name.clone(),
            }
        };
        counter!(
            "worker_jobs_total",
            "job" => entry.job_name.clone(),
            "outcome" => outcome.label()
        )
        .increment(1);

        Ok(Some(outcome))
    }

    /// Delete one eligible entry and commit the deletion.
    async fn claim(&self) -> Result<Option<QueueEntryEntity>, sqlx::Error> {
        let mut tx = begin_read_committed(&self.pool, self.lock_timeout).await?;
        let entry = JobQueueRepository::claim_next(&mut tx, Utc::now()).await?;
        tx.commit().await?;

        if let Some(entry) = &entry {
            debug!(job = %entry.job_name, id = %entry.id, "Claimed queue entry");
        }
        Ok(entry)
    }

    /// Run the job body in its own task and capture the outcome.
    async fn execute(
        &self,
        registration: &JobRegistration,
        entry: &QueueEntryEntity,
    ) -> NewJobResult {
        let ctx = JobContext::new(
            entry.id,
            entry.job_name.clone(),
            registration.capabilities,
            &self.pool,
            entry.parameters.clone(),
        );
        let handler = Arc::clone(&registration.handler);
        let executed_at = Utc::now();
        let start = Instant::now();

        info!(job = %entry.job_name, id = %entry.id, "Job starting");
        let joined = tokio::spawn(async move { handler.run(ctx).await }).await;
        let elapsed = start.elapsed();
        histogram!("worker_job_duration_seconds", "job" => entry.job_name.clone())
            .record(elapsed.as_secs_f64());

        match joined {
            Ok(Ok(value)) => {
                info!(
                    job = %entry.job_name,
                    id = %entry.id,
                    elapsed_ms = elapsed.as_millis(),
                    "Job completed successfully"
                );
                NewJobResult::success(
                    entry.id,
                    entry.job_name.clone(),
                    executed_at,
                    entry.parameters.clone(),
                    value,
                )
            }
            Ok(Err(e)) => {
                error!(
                    job = %entry.job_name,
                    id = %entry.id,
                    elapsed_ms = elapsed.as_millis(),
                    error = %e,
                    "Job failed"
                );
                NewJobResult::failure(
                    entry.id,
                    entry.job_name.clone(),
                    executed_at,
                    entry.parameters.clone(),
                    format!("{:?}", e),
                )
            }
            Err(join_error) => {
                let trace = describe_join_error(join_error);
                error!(
                    job = %entry.job_name,
                    id = %entry.id,
                    elapsed_ms = elapsed.as_millis(),
                    error = %trace,
                    "Job aborted"
                );
                NewJobResult::failure(
                    entry.id,
                    entry.job_name.clone(),
                    executed_at,
                    entry.parameters.clone(),
                    trace,
                )
            }
        }
    }

    /// Write the result row in its own transaction.
    async fn record(&self, result: &NewJobResult) -> Result<(), sqlx::Error> {
        let mut attempt = 1;
        loop {
            match self.try_record(result).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_RECORD_ATTEMPTS && is_transient_db_error(&e) => {
                    warn!(
                        job = %result.job_name,
                        id = %result.id,
                        attempt,
                        error = %e,
                        "Retrying result write"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        job = %result.job_name,
                        id = %result.id,
                        error = %e,
                        "Failed to record job result"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn try_record(&self, result: &NewJobResult) -> Result<(), sqlx::Error> {
        let mut tx = begin_read_committed(&self.pool, self.lock_timeout).await?;
        JobResultRepository::insert(&mut tx, result).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Drain eligible entries, sleeping `idle_interval` whenever the queue is idle.
    pub async fn run(&self, idle_interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        info!(idle_interval_ms = idle_interval.as_millis(), "Worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.run_once().await {
                // Keep draining while there is work
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    debug!(error = %e, "Transient store error, retrying immediately");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Worker iteration failed");
                }
            }

            if sleep_or_shutdown(idle_interval, &mut shutdown_rx).await {
                break;
            }
        }

        info!("Worker shutting down");
    }
}

fn describe_join_error(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        return "job task was cancelled".to_string();
    }

    let payload = join_error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("job panicked: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_describe_panic_with_str() {
        let err = tokio::spawn(async { panic!("exploded") }).await.unwrap_err();
        assert_eq!(describe_join_error(err), "job panicked: exploded");
    }

    #[tokio::test]
    async fn test_describe_panic_with_string() {
        let err = tokio::spawn(async { panic!("code {}", 7) })
            .await
            .unwrap_err();
        assert_eq!(describe_join_error(err), "job panicked: code 7");
    }

    #[tokio::test]
    async fn test_describe_cancelled_task() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        handle.abort();
        let err = handle.await.unwrap_err();
        assert_eq!(describe_join_error(err), "job task was cancelled");
    }

    #[test]
    fn test_outcome_id_and_label() {
        let id = Uuid::new_v4();
        let outcome = WorkOutcome::Discarded {
            id,
            job_name: "ghost".to_string(),
        };
        assert_eq!(outcome.id(), id);
        assert_eq!(outcome.label(), "discarded");
    }
}
