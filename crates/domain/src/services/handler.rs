//! Job handler contract.
//!
//! A job body receives a [`JobContext`] populated strictly according to the
//! capabilities it declared at registration, and returns a JSON payload that
//! is stored as the occurrence's result.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

use crate::models::JobCapabilities;

/// Errors raised when a job body asks for something it did not declare.
#[derive(Debug, Error)]
pub enum JobContextError {
    #[error("Job '{0}' did not declare wants_store_handle")]
    StoreHandleNotDeclared(String),

    #[error("Job '{0}' did not declare wants_parameters")]
    ParametersNotDeclared(String),

    #[error("Invalid parameters for job '{job}': {source}")]
    InvalidParameters {
        job: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Execution context handed to a job body.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: Uuid,
    job_name: String,
    pool: Option<PgPool>,
    parameters: Option<serde_json::Value>,
}

impl JobContext {
    /// Build a context, injecting only what `capabilities` asks for.
    pub fn new(
        job_id: Uuid,
        job_name: impl Into<String>,
        capabilities: JobCapabilities,
        pool: &PgPool,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            job_id,
            job_name: job_name.into(),
            pool: capabilities.wants_store_handle.then(|| pool.clone()),
            parameters: capabilities.wants_parameters.then_some(parameters),
        }
    }

    /// Id of the queue entry being executed.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// The store handle, if the job declared `wants_store_handle`.
    pub fn pool(&self) -> Result<&PgPool, JobContextError> {
        self.pool
            .as_ref()
            .ok_or_else(|| JobContextError::StoreHandleNotDeclared(self.job_name.clone()))
    }

    /// The stored parameters, if the job declared `wants_parameters`.
    pub fn parameters(&self) -> Result<&serde_json::Value, JobContextError> {
        self.parameters
            .as_ref()
            .ok_or_else(|| JobContextError::ParametersNotDeclared(self.job_name.clone()))
    }

    /// Deserialize the stored parameters into a typed payload.
    pub fn parameters_as<T: DeserializeOwned>(&self) -> Result<T, JobContextError> {
        let value = self.parameters()?.clone();
        serde_json::from_value(value).map_err(|source| JobContextError::InvalidParameters {
            job: self.job_name.clone(),
            source,
        })
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    pub fn has_parameters(&self) -> bool {
        self.parameters.is_some()
    }
}

/// Trait for implementing job bodies.
///
/// Returning `Err` marks the occurrence failed; the error chain is stored in
/// the result log.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: JobContext) -> anyhow::Result<serde_json::Value>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    async fn run(&self, ctx: JobContext) -> anyhow::Result<serde_json::Value> {
        (self)(ctx).await
    }
}
