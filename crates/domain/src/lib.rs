//! Domain layer for the job coordinator.
//!
//! This crate contains:
//! - Job registration models (capabilities, cron schedules, enqueue requests)
//! - The job handler contract and its execution context
//! - The process-wide job registry

pub mod models;
pub mod services;
