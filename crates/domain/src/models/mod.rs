//! Domain models for the job coordinator.

pub mod queue;
pub mod registration;
pub mod schedule;

pub use queue::{EnqueueRequest, MAX_JOB_NAME_LENGTH};
pub use registration::{JobCapabilities, JobRegistration};
pub use schedule::{CronSchedule, ScheduleError};
