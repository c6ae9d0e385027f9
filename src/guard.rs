use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::job_store::{DeletedJobs, JobStore};
use crate::app::model::JobType;
use crate::cache::{TtlCache, keys};
use crate::document::DocumentId;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatusReport {
    Processing {
        job_id: uuid::Uuid,
        job_type: JobType,
        attempts: u32,
        created_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
    },
    Failed {
        job_id: uuid::Uuid,
        job_type: JobType,
        exception: String,
        failed_at: DateTime<Utc>,
    },
    NotFound,
}

impl JobStatusReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatusReport::Processing { .. } => "processing",
            JobStatusReport::Failed { .. } => "failed",
            JobStatusReport::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GuardSettings {
    pub cache_ttl: Duration,
    /// How long a failed job keeps blocking new submissions.
    pub failed_window: Duration,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
            failed_window: Duration::from_secs(60),
        }
    }
}

/// Answers whether a document already has a pending or recently failed
/// generation job.
///
/// Answers are memoised per document for `cache_ttl`, so a job pushed or
/// removed by someone else can stay invisible for that window.
pub struct DuplicateJobGuard {
    jobs: Arc<dyn JobStore>,
    cache: Arc<dyn TtlCache<bool>>,
    settings: GuardSettings,
}

impl DuplicateJobGuard {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        cache: Arc<dyn TtlCache<bool>>,
        settings: GuardSettings,
    ) -> Self {
        Self {
            jobs,
            cache,
            settings,
        }
    }

    pub async fn has_active_job(&self, document_id: DocumentId) -> anyhow::Result<bool> {
        let key = keys::document_jobs(document_id);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let pending = self
            .jobs
            .pending_for_document(document_id)
            .await
            .context("load pending jobs")?;
        let active = if pending.is_empty() {
            let failed_window = chrono::Duration::from_std(self.settings.failed_window)
                .context("failed job window out of range")?;
            let cutoff = Utc::now() - failed_window;
            self.jobs
                .failed_for_document(document_id)
                .await
                .context("load failed jobs")?
                .iter()
                .any(|failed| failed.failed_at > cutoff)
        } else {
            true
        };

        tracing::debug!(%document_id, active, "duplicate job check");
        self.cache
            .set(&key, active, self.settings.cache_ttl)
            .await;
        Ok(active)
    }

    pub async fn job_status(&self, document_id: DocumentId) -> anyhow::Result<JobStatusReport> {
        let pending = self
            .jobs
            .pending_for_document(document_id)
            .await
            .context("load pending jobs")?;
        if let Some(job) = pending.into_iter().next() {
            return Ok(JobStatusReport::Processing {
                job_id: job.id,
                job_type: job.job_type,
                attempts: job.attempts,
                created_at: job.created_at,
                available_at: job.available_at,
            });
        }

        let failed = self
            .jobs
            .failed_for_document(document_id)
            .await
            .context("load failed jobs")?;
        if let Some(failed) = failed.into_iter().last() {
            return Ok(JobStatusReport::Failed {
                job_id: failed.job.id,
                job_type: failed.job.job_type,
                exception: failed.exception,
                failed_at: failed.failed_at,
            });
        }

        Ok(JobStatusReport::NotFound)
    }

    pub async fn delete_jobs(&self, document_id: DocumentId) -> anyhow::Result<DeletedJobs> {
        let deleted = self
            .jobs
            .delete_for_document(document_id)
            .await
            .context("delete jobs")?;
        self.invalidate(document_id).await;
        tracing::info!(
            %document_id,
            active = deleted.active,
            failed = deleted.failed,
            "deleted generation jobs"
        );
        Ok(deleted)
    }

    pub async fn invalidate(&self, document_id: DocumentId) {
        self.cache.forget(&keys::document_jobs(document_id)).await;
    }
}
