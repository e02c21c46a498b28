//! Domain services for the job coordinator.
//!
//! Services hold the job bodies' contract and the registry that resolves
//! job names into callables.

pub mod handler;
pub mod registry;

pub use handler::{JobContext, JobContextError, JobHandler};
pub use registry::{JobRegistry, RegistryError};
