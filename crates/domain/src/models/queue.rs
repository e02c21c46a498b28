//! Queue entry requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Maximum length of a job name, matching the `job_name` column width.
pub const MAX_JOB_NAME_LENGTH: usize = 255;

/// Request to enqueue one occurrence of a job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct EnqueueRequest {
    #[validate(length(min = 1, max = 255, message = "Job name must be 1-255 characters"))]
    pub job_name: String,

    /// Earliest eligibility; `None` means immediately eligible.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,

    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl EnqueueRequest {
    /// Request an immediately eligible occurrence with empty parameters.
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            not_before: None,
            parameters: empty_parameters(),
        }
    }

    pub fn not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}
