use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use tokio::sync::Notify;

use crate::app::job_store::JobStore;
use crate::app::queue::InProcessQueue;
use crate::app::runner::JobRunner;

/// Reservations older than the job timeout plus this grace are treated as
/// abandoned by a crashed worker.
const RESERVATION_GRACE: Duration = Duration::from_secs(60);

pub struct Worker {
    jobs: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
    queue: InProcessQueue,
    wake: Arc<Notify>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        runner: Arc<JobRunner>,
        queue: InProcessQueue,
        wake: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            runner,
            queue,
            wake,
            poll_interval,
        }
    }

    fn reservation_ttl(&self) -> Duration {
        self.runner.policy().timeout + RESERVATION_GRACE
    }

    /// Reserves as many available jobs as there are free slots and spawns
    /// them. Returns the handles of the spawned jobs.
    async fn dispatch_available(&self) -> anyhow::Result<Vec<tokio::task::JoinHandle<()>>> {
        let slots = self.queue.available_slots();
        if slots == 0 {
            return Ok(Vec::new());
        }
        let reserved = self
            .jobs
            .reserve_available(Utc::now(), self.reservation_ttl(), slots)
            .await
            .context("reserve jobs")?;

        let mut handles = Vec::with_capacity(reserved.len());
        for job in reserved {
            let runner = Arc::clone(&self.runner);
            handles.push(self.queue.spawn(async move {
                let job_id = job.id;
                if let Err(err) = runner.run_reserved(job).await {
                    tracing::error!(%job_id, ?err, "job bookkeeping failed");
                }
            }));
        }
        Ok(handles)
    }

    /// Runs until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        tracing::info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "worker started"
        );
        loop {
            if let Err(err) = self.dispatch_available().await {
                tracing::error!(?err, "worker poll failed");
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("worker stopped");
    }

    /// Processes jobs in the foreground until none remain pending, including
    /// jobs waiting out a retry delay.
    pub async fn run_until_idle(&self) -> anyhow::Result<()> {
        loop {
            let handles = self.dispatch_available().await?;
            if handles.is_empty() {
                if self.jobs.pending_count().await? == 0 {
                    return Ok(());
                }
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            for handle in handles {
                handle.await.context("join job task")?;
            }
        }
    }
}
