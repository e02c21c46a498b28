//! Job registration model.

use std::fmt;
use std::sync::Arc;

use super::schedule::CronSchedule;
use crate::services::handler::JobHandler;

/// What a job body wants injected when it is invoked.
///
/// Declared explicitly at registration so the worker never has to inspect
/// the callable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCapabilities {
    /// Receive a store handle (a connection pool) in the job context.
    pub wants_store_handle: bool,
    /// Receive the queue entry's stored parameters in the job context.
    pub wants_parameters: bool,
}

impl JobCapabilities {
    /// Neither a store handle nor parameters.
    pub const NONE: Self = Self {
        wants_store_handle: false,
        wants_parameters: false,
    };

    /// Store handle and parameters.
    pub const ALL: Self = Self {
        wants_store_handle: true,
        wants_parameters: true,
    };

    pub const fn store_handle() -> Self {
        Self {
            wants_store_handle: true,
            wants_parameters: false,
        }
    }

    pub const fn parameters() -> Self {
        Self {
            wants_store_handle: false,
            wants_parameters: true,
        }
    }
}

/// A registered job: its name, optional periodic schedule and callable.
///
/// Registrations live only in process memory and are rebuilt on every start.
#[derive(Clone)]
pub struct JobRegistration {
    pub name: String,
    /// `None` for jobs that only run when enqueued explicitly.
    pub schedule: Option<CronSchedule>,
    pub capabilities: JobCapabilities,
    pub handler: Arc<dyn JobHandler>,
}

impl JobRegistration {
    /// Whether the cron scheduler keeps this job queued.
    pub fn is_periodic(&self) -> bool {
        self.schedule.is_some()
    }
}

impl fmt::Debug for JobRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistration")
            .field("name", &self.name)
            .field("schedule", &self.schedule.as_ref().map(|s| s.expression()))
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
