use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::Notify;

use crate::app::dispatcher::QueueDispatcher;
use crate::app::job_store::{JobStore, LocalFsJobStore};
use crate::app::queue::InProcessQueue;
use crate::app::runner::JobRunner;
use crate::app::worker::Worker;
use crate::audit::{AuditLog, LocalFsAuditLog};
use crate::billing::{BillingLedger, LocalFsLedger};
use crate::cache::InMemoryTtlCache;
use crate::config::Config;
use crate::document::{DocumentStore, LocalFsDocumentStore};
use crate::events::BroadcastEventBus;
use crate::generation::{GenerationOrchestrator, GenerationPipeline};
use crate::guard::DuplicateJobGuard;
use crate::llm::LlmRegistry;

/// Every long-lived component, wired against one data directory.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub documents: Arc<dyn DocumentStore>,
    pub jobs: Arc<dyn JobStore>,
    pub ledger: Arc<dyn BillingLedger>,
    pub audit: Arc<dyn AuditLog>,
    pub events: Arc<BroadcastEventBus>,
    pub guard: Arc<DuplicateJobGuard>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub runner: Arc<JobRunner>,
    pub worker: Arc<Worker>,
}

impl AppContext {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("build http client")?;
        let llm = LlmRegistry::from_config(&config, http);
        Ok(Self::new(config, llm))
    }

    pub fn new(config: Config, llm: LlmRegistry) -> Self {
        let data_dir = config.data_dir.clone();
        let documents: Arc<dyn DocumentStore> = Arc::new(LocalFsDocumentStore::new(&data_dir));
        let jobs: Arc<dyn JobStore> = Arc::new(LocalFsJobStore::new(&data_dir));
        let ledger: Arc<dyn BillingLedger> = Arc::new(LocalFsLedger::new(&data_dir));
        let audit: Arc<dyn AuditLog> = Arc::new(LocalFsAuditLog::new(&data_dir));
        let events = Arc::new(BroadcastEventBus::default());

        let guard = Arc::new(DuplicateJobGuard::new(
            Arc::clone(&jobs),
            Arc::new(InMemoryTtlCache::new()),
            config.guard,
        ));

        let wake = Arc::new(Notify::new());
        let dispatcher = Arc::new(QueueDispatcher::new(Arc::clone(&jobs), Arc::clone(&wake)));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            Arc::clone(&documents),
            Arc::clone(&guard),
            dispatcher,
            Arc::clone(&ledger),
        ));

        let pipeline = Arc::new(GenerationPipeline::new(
            Arc::clone(&documents),
            llm,
            Arc::clone(&audit),
            events.clone(),
        ));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&jobs),
            pipeline,
            config.retry.clone(),
        ));
        let worker = Arc::new(Worker::new(
            Arc::clone(&jobs),
            Arc::clone(&runner),
            InProcessQueue::new(config.max_concurrency),
            wake,
            config.worker_poll_interval,
        ));

        Self {
            config,
            documents,
            jobs,
            ledger,
            audit,
            events,
            guard,
            orchestrator,
            runner,
            worker,
        }
    }
}
