use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::app::model::{FailedJob, GenerationJob};
use crate::document::DocumentId;
use crate::fs_json::{
    list_json_files, list_subdirs, read_json, remove_if_exists, write_json_atomic,
};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DeletedJobs {
    pub active: usize,
    pub failed: usize,
}

/// Structured job storage, keyed by document so per-document lookups never
/// scan unrelated jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn push(&self, job: &GenerationJob) -> anyhow::Result<()>;
    /// Rewrites a pending job in place. Returns `false`, writing nothing,
    /// when the record was deleted in the meantime.
    async fn save(&self, job: &GenerationJob) -> anyhow::Result<bool>;
    async fn pending_for_document(
        &self,
        document_id: DocumentId,
    ) -> anyhow::Result<Vec<GenerationJob>>;
    async fn failed_for_document(
        &self,
        document_id: DocumentId,
    ) -> anyhow::Result<Vec<FailedJob>>;
    /// Marks up to `limit` available jobs as reserved and returns them.
    async fn reserve_available(
        &self,
        now: DateTime<Utc>,
        reservation_ttl: Duration,
        limit: usize,
    ) -> anyhow::Result<Vec<GenerationJob>>;
    /// Puts a reserved job back without touching its attempt count. `None`
    /// when the job no longer exists.
    async fn release(
        &self,
        job: &GenerationJob,
        delay: Duration,
    ) -> anyhow::Result<Option<GenerationJob>>;
    async fn complete(&self, job: &GenerationJob) -> anyhow::Result<()>;
    /// Moves a pending job to the failed store. `None` when the job no
    /// longer exists.
    async fn fail(
        &self,
        job: &GenerationJob,
        exception: &str,
    ) -> anyhow::Result<Option<FailedJob>>;
    async fn delete_for_document(&self, document_id: DocumentId) -> anyhow::Result<DeletedJobs>;
    async fn pending_count(&self) -> anyhow::Result<usize>;
}

#[derive(Debug)]
pub struct LocalFsJobStore {
    base_dir: PathBuf,
    reserve_lock: Mutex<()>,
}

impl LocalFsJobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            reserve_lock: Mutex::new(()),
        }
    }

    fn pending_dir(&self) -> PathBuf {
        self.base_dir.join("jobs").join("pending")
    }

    fn failed_dir(&self) -> PathBuf {
        self.base_dir.join("jobs").join("failed")
    }

    fn pending_path(&self, job: &GenerationJob) -> PathBuf {
        self.pending_dir()
            .join(job.document_id.to_string())
            .join(format!("{}.json", job.id))
    }

    fn failed_path(&self, job: &GenerationJob) -> PathBuf {
        self.failed_dir()
            .join(job.document_id.to_string())
            .join(format!("{}.json", job.id))
    }

    async fn read_pending_dir(&self, dir: PathBuf) -> anyhow::Result<Vec<GenerationJob>> {
        let mut jobs = Vec::new();
        for path in list_json_files(&dir).await? {
            // A job can be completed by another worker between listing and reading.
            if let Some(job) = read_json::<GenerationJob>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    /// Callers must hold `reserve_lock`.
    async fn overwrite_pending(&self, job: &GenerationJob) -> anyhow::Result<bool> {
        let path = self.pending_path(job);
        if !tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?
        {
            return Ok(false);
        }
        write_json_atomic(&path, job)
            .await
            .context("write pending job")?;
        Ok(true)
    }

    async fn all_pending(&self) -> anyhow::Result<Vec<GenerationJob>> {
        let mut jobs = Vec::new();
        for dir in list_subdirs(&self.pending_dir()).await? {
            jobs.extend(self.read_pending_dir(dir).await?);
        }
        jobs.sort_by(|a, b| a.available_at.cmp(&b.available_at));
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for LocalFsJobStore {
    async fn push(&self, job: &GenerationJob) -> anyhow::Result<()> {
        write_json_atomic(&self.pending_path(job), job)
            .await
            .context("write pending job")
    }

    async fn save(&self, job: &GenerationJob) -> anyhow::Result<bool> {
        let _guard = self.reserve_lock.lock().await;
        self.overwrite_pending(job).await
    }

    async fn pending_for_document(
        &self,
        document_id: DocumentId,
    ) -> anyhow::Result<Vec<GenerationJob>> {
        self.read_pending_dir(self.pending_dir().join(document_id.to_string()))
            .await
    }

    async fn failed_for_document(
        &self,
        document_id: DocumentId,
    ) -> anyhow::Result<Vec<FailedJob>> {
        let dir = self.failed_dir().join(document_id.to_string());
        let mut jobs = Vec::new();
        for path in list_json_files(&dir).await? {
            if let Some(job) = read_json::<FailedJob>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| a.failed_at.cmp(&b.failed_at));
        Ok(jobs)
    }

    async fn reserve_available(
        &self,
        now: DateTime<Utc>,
        reservation_ttl: Duration,
        limit: usize,
    ) -> anyhow::Result<Vec<GenerationJob>> {
        let _guard = self.reserve_lock.lock().await;

        let mut reserved = Vec::new();
        for mut job in self.all_pending().await? {
            if reserved.len() >= limit {
                break;
            }
            if !job.is_available(now, reservation_ttl) {
                continue;
            }
            job.reserved_at = Some(now);
            if self
                .overwrite_pending(&job)
                .await
                .context("mark job reserved")?
            {
                reserved.push(job);
            }
        }
        Ok(reserved)
    }

    async fn release(
        &self,
        job: &GenerationJob,
        delay: Duration,
    ) -> anyhow::Result<Option<GenerationJob>> {
        let delay = chrono::Duration::from_std(delay).context("release delay out of range")?;
        let mut released = job.clone();
        released.reserved_at = None;
        released.available_at = Utc::now() + delay;

        let _guard = self.reserve_lock.lock().await;
        if !self
            .overwrite_pending(&released)
            .await
            .context("release job")?
        {
            return Ok(None);
        }
        Ok(Some(released))
    }

    async fn complete(&self, job: &GenerationJob) -> anyhow::Result<()> {
        remove_if_exists(&self.pending_path(job))
            .await
            .context("delete completed job")?;
        Ok(())
    }

    async fn fail(
        &self,
        job: &GenerationJob,
        exception: &str,
    ) -> anyhow::Result<Option<FailedJob>> {
        let _guard = self.reserve_lock.lock().await;
        let pending = self.pending_path(job);
        if !tokio::fs::try_exists(&pending)
            .await
            .with_context(|| format!("stat: {}", pending.display()))?
        {
            return Ok(None);
        }

        let mut job = job.clone();
        job.reserved_at = None;
        let failed = FailedJob {
            job,
            exception: exception.to_owned(),
            failed_at: Utc::now(),
        };
        write_json_atomic(&self.failed_path(&failed.job), &failed)
            .await
            .context("write failed job")?;
        remove_if_exists(&pending)
            .await
            .context("delete pending job")?;
        Ok(Some(failed))
    }

    async fn delete_for_document(&self, document_id: DocumentId) -> anyhow::Result<DeletedJobs> {
        let _guard = self.reserve_lock.lock().await;

        let mut deleted = DeletedJobs::default();
        for job in self.pending_for_document(document_id).await? {
            if remove_if_exists(&self.pending_path(&job)).await? {
                deleted.active += 1;
            }
        }
        for failed in self.failed_for_document(document_id).await? {
            if remove_if_exists(&self.failed_path(&failed.job)).await? {
                deleted.failed += 1;
            }
        }
        Ok(deleted)
    }

    async fn pending_count(&self) -> anyhow::Result<usize> {
        Ok(self.all_pending().await?.len())
    }
}
