//! Background loops and built-in jobs.
//!
//! - [`election`]: lease-based leader election
//! - [`cron`]: keeps periodic jobs queued while this instance leads
//! - [`worker`]: claims and executes due queue entries
//! - [`service`]: starts and stops the three loops together

pub mod cron;
pub mod election;
pub mod purge_results;
pub mod service;
pub mod worker;

use std::time::Duration;
use tokio::sync::watch;

use domain::models::JobCapabilities;
use domain::services::{JobRegistry, RegistryError};

use crate::config::ResultsConfig;

pub use cron::{CronScheduler, ScheduleReport, UpsertPlan};
pub use election::{ElectionOutcome, LeaderElector, LeaseDecision};
pub use purge_results::{PurgeResultsJob, PURGE_RESULTS_JOB};
pub use service::{CoordinatorSettings, JobCoordinator};
pub use worker::{WorkOutcome, Worker};

/// Register the jobs that ship with the coordinator.
pub fn register_builtin_jobs(
    registry: &JobRegistry,
    results: &ResultsConfig,
) -> Result<(), RegistryError> {
    if results.purge_schedule.is_empty() {
        return Ok(());
    }

    registry.register(
        PURGE_RESULTS_JOB,
        &results.purge_schedule,
        JobCapabilities::store_handle(),
        PurgeResultsJob::new(results.retention_days),
    )
}

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns `true` when the loop should exit.
pub(crate) async fn sleep_or_shutdown(
    duration: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown_rx.changed() => {
            // A dropped sender also means shutdown
            changed.is_err() || *shutdown_rx.borrow()
        }
    }
}
