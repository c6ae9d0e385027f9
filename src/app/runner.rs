use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::app::job_store::JobStore;
use crate::app::model::{GenerationJob, RetryPolicy};
use crate::document::DocumentId;

/// The unit of work executed for each reserved job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &GenerationJob) -> anyhow::Result<()>;
    /// Runs once, after the last attempt has failed.
    async fn failed(&self, job: &GenerationJob, error: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Released { attempts: u32, delay: Duration },
    Failed { attempts: u32 },
    /// Another job for the same document was running; no attempt counted.
    Deferred,
    /// The job record was deleted while the attempt ran. Nothing is retried
    /// and the `failed` hook does not run.
    Discarded,
}

pub struct JobRunner {
    jobs: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    policy: RetryPolicy,
    busy_delay: Duration,
    running: Arc<Mutex<HashSet<DocumentId>>>,
}

struct DocumentClaim {
    running: Arc<Mutex<HashSet<DocumentId>>>,
    document_id: DocumentId,
}

impl Drop for DocumentClaim {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.document_id);
        }
    }
}

impl JobRunner {
    pub fn new(jobs: Arc<dyn JobStore>, handler: Arc<dyn JobHandler>, policy: RetryPolicy) -> Self {
        Self {
            jobs,
            handler,
            policy,
            busy_delay: Duration::from_secs(5),
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_busy_delay(mut self, busy_delay: Duration) -> Self {
        self.busy_delay = busy_delay;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn claim(&self, document_id: DocumentId) -> Option<DocumentClaim> {
        let mut running = self.running.lock().ok()?;
        if !running.insert(document_id) {
            return None;
        }
        Some(DocumentClaim {
            running: Arc::clone(&self.running),
            document_id,
        })
    }

    /// Runs one reserved job to its next resting state: deleted, released
    /// for a retry, or moved to the failed store.
    pub async fn run_reserved(&self, mut job: GenerationJob) -> anyhow::Result<RunOutcome> {
        let Some(_claim) = self.claim(job.document_id) else {
            tracing::debug!(
                job_id = %job.id,
                document_id = %job.document_id,
                "document busy; releasing job"
            );
            let released = self
                .jobs
                .release(&job, self.busy_delay)
                .await
                .context("release busy job")?;
            return Ok(match released {
                Some(_) => RunOutcome::Deferred,
                None => RunOutcome::Discarded,
            });
        };

        job.attempts += 1;
        if !self.jobs.save(&job).await.context("record attempt")? {
            tracing::info!(job_id = %job.id, document_id = %job.document_id, "job deleted before it started");
            return Ok(RunOutcome::Discarded);
        }
        tracing::info!(
            job_id = %job.id,
            document_id = %job.document_id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "job started"
        );

        let result = match tokio::time::timeout(self.policy.timeout, self.handler.handle(&job)).await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "job timed out after {}s",
                self.policy.timeout.as_secs()
            )),
        };

        let err = match result {
            Ok(()) => {
                self.jobs.complete(&job).await.context("complete job")?;
                tracing::info!(job_id = %job.id, attempt = job.attempts, "job completed");
                return Ok(RunOutcome::Completed);
            }
            Err(err) => err,
        };
        let message = format!("{err:#}");

        match self.policy.next_delay(job.attempts) {
            Some(delay) => {
                tracing::warn!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    attempt = job.attempts,
                    retry_in_secs = delay.as_secs(),
                    error = %message,
                    "job attempt failed; will retry"
                );
                job.last_error = Some(message);
                let released = self
                    .jobs
                    .release(&job, delay)
                    .await
                    .context("release job for retry")?;
                if released.is_none() {
                    tracing::info!(job_id = %job.id, document_id = %job.document_id, "job deleted during attempt; not retrying");
                    return Ok(RunOutcome::Discarded);
                }
                Ok(RunOutcome::Released {
                    attempts: job.attempts,
                    delay,
                })
            }
            None => {
                tracing::error!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    error = %message,
                    "job failed permanently"
                );
                job.last_error = Some(message.clone());
                let failed = self
                    .jobs
                    .fail(&job, &message)
                    .await
                    .context("move job to failed store")?;
                if failed.is_none() {
                    tracing::info!(job_id = %job.id, document_id = %job.document_id, "job deleted during final attempt");
                    return Ok(RunOutcome::Discarded);
                }
                self.handler.failed(&job, &message).await;
                Ok(RunOutcome::Failed {
                    attempts: job.attempts,
                })
            }
        }
    }
}
