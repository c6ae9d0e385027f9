use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::app::job_store::JobStore;
use crate::app::model::GenerationJob;

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &GenerationJob) -> anyhow::Result<()>;
}

/// Persists the job to the pending store and wakes the local worker.
#[derive(Clone)]
pub struct QueueDispatcher {
    jobs: Arc<dyn JobStore>,
    wake: Arc<Notify>,
}

impl QueueDispatcher {
    pub fn new(jobs: Arc<dyn JobStore>, wake: Arc<Notify>) -> Self {
        Self { jobs, wake }
    }
}

#[async_trait]
impl JobDispatcher for QueueDispatcher {
    async fn dispatch(&self, job: &GenerationJob) -> anyhow::Result<()> {
        self.jobs.push(job).await.context("enqueue generation job")?;
        tracing::info!(
            job_id = %job.id,
            document_id = %job.document_id,
            job_type = %job.job_type,
            queue = %job.queue,
            "job dispatched"
        );
        self.wake.notify_one();
        Ok(())
    }
}
