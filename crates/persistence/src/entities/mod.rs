//! Entity definitions (database row mappings).

pub mod job_result;
pub mod lease;
pub mod queue_entry;

pub use job_result::{JobResultEntity, NewJobResult};
pub use lease::{LeaseEntity, LEASE_ID};
pub use queue_entry::QueueEntryEntity;
