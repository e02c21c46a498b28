//! Repository implementations for database operations.

pub mod job_queue;
pub mod job_result;
pub mod lease;

pub use job_queue::JobQueueRepository;
pub use job_result::JobResultRepository;
pub use lease::LeaseRepository;
