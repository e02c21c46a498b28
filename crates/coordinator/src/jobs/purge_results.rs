//! Result retention background job.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use domain::services::{JobContext, JobHandler};
use persistence::repositories::JobResultRepository;

/// Registry name of the purge job.
pub const PURGE_RESULTS_JOB: &str = "purge_job_results";

/// Deletes result rows older than the retention period.
pub struct PurgeResultsJob {
    retention_days: u32,
    batch_size: i64,
}

impl PurgeResultsJob {
    /// Create a new purge job.
    ///
    /// # Arguments
    /// * `retention_days` - Number of days to retain result rows
    pub fn new(retention_days: u32) -> Self {
        Self {
            retention_days,
            batch_size: 10_000,
        }
    }
}

#[async_trait]
impl JobHandler for PurgeResultsJob {
    async fn run(&self, ctx: JobContext) -> anyhow::Result<serde_json::Value> {
        let repo = JobResultRepository::new(ctx.pool()?.clone());
        let cutoff = Utc::now()
            .checked_sub_signed(chrono::Duration::days(i64::from(self.retention_days)))
            .ok_or_else(|| {
                anyhow::anyhow!("retention_days {} is out of range", self.retention_days)
            })?;

        let deleted = repo
            .delete_older_than(cutoff, self.batch_size)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete old job results: {}", e))?;

        info!(
            deleted,
            retention_days = self.retention_days,
            "Cleaned up old job results"
        );

        Ok(json!({
            "deleted": deleted,
            "retention_days": self.retention_days,
        }))
    }
}
