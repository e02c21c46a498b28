//! Database-coordinated job scheduler.
//!
//! Redundant instances share one PostgreSQL database: a lease row elects the
//! instance that keeps periodic jobs queued, and every instance claims and
//! runs due queue entries.

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;

pub use error::CoordinatorError;
pub use jobs::{CoordinatorSettings, JobCoordinator};
