//! Persistence layer for the job coordinator.
//!
//! This crate contains:
//! - Database connection and transaction management
//! - Entity definitions (lease, queue entry, result rows)
//! - Repository implementations
//! - Query metrics

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
