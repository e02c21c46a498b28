//! Job registry.
//!
//! Maps a job name to its schedule, capabilities and callable. The registry
//! is populated once at process start and shared by the cron scheduler (to
//! find periodic jobs) and the worker (to resolve claimed job names).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    CronSchedule, JobCapabilities, JobRegistration, ScheduleError, MAX_JOB_NAME_LENGTH,
};
use crate::services::handler::JobHandler;

/// Registration failures. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("Invalid job name '{0}': must be 1-255 characters")]
    InvalidName(String),

    #[error("Invalid schedule for job '{job}': {source}")]
    InvalidSchedule {
        job: String,
        #[source]
        source: ScheduleError,
    },
}

/// Process-wide table of registered jobs.
///
/// Cloning is cheap; all clones share the same table.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Arc<JobRegistration>>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a periodic job.
    ///
    /// Fails on a duplicate name or an unparsable schedule expression.
    pub fn register<H>(
        &self,
        name: impl Into<String>,
        schedule: &str,
        capabilities: JobCapabilities,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: JobHandler + 'static,
    {
        let name = name.into();
        let schedule =
            CronSchedule::parse(schedule).map_err(|source| RegistryError::InvalidSchedule {
                job: name.clone(),
                source,
            })?;

        self.insert(JobRegistration {
            name,
            schedule: Some(schedule),
            capabilities,
            handler: Arc::new(handler),
        })
    }

    /// Register a job that only runs when enqueued explicitly.
    pub fn register_on_demand<H>(
        &self,
        name: impl Into<String>,
        capabilities: JobCapabilities,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: JobHandler + 'static,
    {
        self.insert(JobRegistration {
            name: name.into(),
            schedule: None,
            capabilities,
            handler: Arc::new(handler),
        })
    }

    fn insert(&self, registration: JobRegistration) -> Result<(), RegistryError> {
        if registration.name.is_empty() || registration.name.len() > MAX_JOB_NAME_LENGTH {
            return Err(RegistryError::InvalidName(registration.name));
        }

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&registration.name) {
            return Err(RegistryError::DuplicateJob(registration.name));
        }

        info!(
            job = %registration.name,
            schedule = registration.schedule.as_ref().map(|s| s.expression()).unwrap_or("on-demand"),
            wants_store_handle = registration.capabilities.wants_store_handle,
            wants_parameters = registration.capabilities.wants_parameters,
            "Job registered"
        );
        jobs.insert(registration.name.clone(), Arc::new(registration));
        Ok(())
    }

    /// Look up a registration by job name.
    pub fn get(&self, name: &str) -> Option<Arc<JobRegistration>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All registrations carrying a periodic schedule.
    pub fn periodic(&self) -> Vec<Arc<JobRegistration>> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.is_periodic())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    /// Registered job names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration. Meant for isolating tests.
    pub fn clear(&self) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Job registry cleared");
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::handler::JobContext;
    use serde_json::json;

    async fn noop(_ctx: JobContext) -> anyhow::Result<serde_json::Value> {
        Ok(json!({}))
    }

    #[test]
    fn test_register_and_get() {
        let registry = JobRegistry::new();
        registry
            .register("ping", "* * * * *", JobCapabilities::NONE, noop)
            .unwrap();

        let job = registry.get("ping").expect("registered");
        assert_eq!(job.name, "ping");
        assert!(job.is_periodic());
        assert_eq!(job.schedule.as_ref().unwrap().expression(), "* * * * *");
        assert!(registry.get("pong").is_none());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = JobRegistry::new();
        registry
            .register("ping", "* * * * *", JobCapabilities::NONE, noop)
            .unwrap();

        let err = registry
            .register_on_demand("ping", JobCapabilities::ALL, noop)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateJob(ref name) if name == "ping"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_schedule_fails() {
        let registry = JobRegistry::new();
        let err = registry
            .register("broken", "not a cron", JobCapabilities::NONE, noop)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchedule { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_name_fails() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.register_on_demand("", JobCapabilities::NONE, noop),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register_on_demand("n".repeat(256), JobCapabilities::NONE, noop),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_periodic_excludes_on_demand() {
        let registry = JobRegistry::new();
        registry
            .register("b_periodic", "0 * * * *", JobCapabilities::NONE, noop)
            .unwrap();
        registry
            .register("a_periodic", "*/5 * * * *", JobCapabilities::NONE, noop)
            .unwrap();
        registry
            .register_on_demand("adhoc", JobCapabilities::parameters(), noop)
            .unwrap();

        let periodic: Vec<_> = registry.periodic().iter().map(|r| r.name.clone()).collect();
        assert_eq!(periodic, vec!["a_periodic", "b_periodic"]);
        assert_eq!(registry.names(), vec!["a_periodic", "adhoc", "b_periodic"]);
    }

    #[test]
    fn test_clear_resets_state() {
        let registry = JobRegistry::new();
        registry
            .register("ping", "* * * * *", JobCapabilities::NONE, noop)
            .unwrap();
        registry.clear();
        assert!(registry.is_empty());

        // The same name can be registered again after a clear
        registry
            .register("ping", "* * * * *", JobCapabilities::NONE, noop)
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = JobRegistry::new();
        let clone = registry.clone();
        clone
            .register_on_demand("shared", JobCapabilities::NONE, noop)
            .unwrap();
        assert!(registry.get("shared").is_some());
    }
}
