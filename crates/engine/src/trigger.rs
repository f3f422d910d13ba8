//! Seam between the orchestrator and the job platform.

use anyhow::Result;
use async_trait::async_trait;
use jobhook_api::JobsClient;
use jobhook_types::JobInvocationParams;
use tracing::{debug, info};

/// Fire a remote job for a run.
///
/// Implementations return once the platform accepted the run; they never wait
/// for the job itself to finish.
#[async_trait]
pub trait JobTrigger: Send + Sync {
    async fn trigger(&self, params: &JobInvocationParams) -> Result<()>;
}

/// Trigger backed by the platform's Jobs API.
pub struct PlatformJobTrigger {
    client: JobsClient,
}

impl PlatformJobTrigger {
    pub fn new(client: JobsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobTrigger for PlatformJobTrigger {
    async fn trigger(&self, params: &JobInvocationParams) -> Result<()> {
        let response = self.client.trigger(params).await?;
        info!(
            run_id = %params.correlation_id,
            job_id = params.job_id,
            platform_run_id = ?response.run_id,
            "job run submitted"
        );
        Ok(())
    }
}

/// Trigger that only logs. Useful for local runs without platform credentials.
pub struct NoopTrigger;

#[async_trait]
impl JobTrigger for NoopTrigger {
    async fn trigger(&self, params: &JobInvocationParams) -> Result<()> {
        debug!(run_id = %params.correlation_id, job_id = params.job_id, url = %params.url, "noop trigger");
        Ok(())
    }
}
