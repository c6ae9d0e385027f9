use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::app::dispatcher::JobDispatcher;
use crate::app::job_store::DeletedJobs;
use crate::app::model::{GenerationJob, JobType};
use crate::billing::BillingLedger;
use crate::document::{Document, DocumentId, DocumentStatus, DocumentStore};
use crate::generation::error::{GenerationError, ensure_transition};
use crate::guard::{DuplicateJobGuard, JobStatusReport};
use crate::progress::StatusReport;

/// Who pays for a stage-2 run, and how much.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingContext {
    pub user_id: String,
    pub amount: u64,
}

impl BillingContext {
    pub fn owner_of(document: &Document, amount: u64) -> Self {
        Self {
            user_id: document.user_id.clone(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StartResult {
    pub success: bool,
    pub message: String,
}

/// Starts either stage: duplicate check, transition check, stage-2 debit,
/// then enqueue.
const JOBS_DELETED_MESSAGE: &str = "generation job was deleted by an operator";

fn log_refusal(document_id: DocumentId, err: &GenerationError, message: &str) {
    if err.is_precondition() {
        tracing::warn!(%document_id, error = %err, "{message}");
    } else {
        tracing::error!(%document_id, error = %err, "{message}");
    }
}

pub struct GenerationOrchestrator {
    documents: Arc<dyn DocumentStore>,
    guard: Arc<DuplicateJobGuard>,
    dispatcher: Arc<dyn JobDispatcher>,
    ledger: Arc<dyn BillingLedger>,
    starting: Arc<Mutex<HashSet<DocumentId>>>,
}

struct StartClaim {
    starting: Arc<Mutex<HashSet<DocumentId>>>,
    document_id: DocumentId,
}

impl Drop for StartClaim {
    fn drop(&mut self) {
        if let Ok(mut starting) = self.starting.lock() {
            starting.remove(&self.document_id);
        }
    }
}

/// Everything stage 2 needs before it may be enqueued: the lifecycle edge,
/// an outline, and references, checked in that order.
pub fn check_full_generation_preconditions(document: &Document) -> Result<(), GenerationError> {
    ensure_transition(document.status, DocumentStatus::FullGenerating)?;
    if !document.has_minimal_structure() {
        return Err(GenerationError::StructureRequired);
    }
    if !document.has_references() {
        return Err(GenerationError::ReferencesRequired);
    }
    Ok(())
}

pub fn can_start_full_generation_with_references(document: &Document) -> bool {
    check_full_generation_preconditions(document).is_ok()
}

impl GenerationOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        guard: Arc<DuplicateJobGuard>,
        dispatcher: Arc<dyn JobDispatcher>,
        ledger: Arc<dyn BillingLedger>,
    ) -> Self {
        Self {
            documents,
            guard,
            dispatcher,
            ledger,
            starting: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Serializes concurrent start requests for one document inside this
    /// process. The guard's cache window still applies across processes.
    fn claim(&self, document_id: DocumentId) -> Result<StartClaim, GenerationError> {
        let mut starting = self
            .starting
            .lock()
            .map_err(|_| anyhow::anyhow!("start claim lock poisoned"))?;
        if !starting.insert(document_id) {
            return Err(GenerationError::DuplicateJob(document_id));
        }
        Ok(StartClaim {
            starting: Arc::clone(&self.starting),
            document_id,
        })
    }

    pub async fn load(&self, document_id: DocumentId) -> Result<Document, GenerationError> {
        self.documents
            .get(document_id)
            .await?
            .ok_or(GenerationError::DocumentNotFound(document_id))
    }

    async fn ensure_no_active_job(&self, document_id: DocumentId) -> Result<(), GenerationError> {
        if self.guard.has_active_job(document_id).await? {
            return Err(GenerationError::DuplicateJob(document_id));
        }
        Ok(())
    }

    pub async fn start_base_generation(
        &self,
        document_id: DocumentId,
    ) -> Result<Document, GenerationError> {
        let _claim = self.claim(document_id)?;
        let mut document = self.load(document_id).await?;
        self.ensure_no_active_job(document_id).await?;
        ensure_transition(document.status, DocumentStatus::PreGenerating)?;

        let prior = document.clone();
        document.status = DocumentStatus::PreGenerating;
        document.error_message = None;
        document.touch();
        self.documents.put(&document).await?;

        let job = GenerationJob::new(JobType::Structure, document_id);
        if let Err(err) = self.dispatcher.dispatch(&job).await {
            self.restore(&prior).await;
            return Err(GenerationError::Dispatch(format!("{err:#}")));
        }
        self.guard.invalidate(document_id).await;

        tracing::info!(%document_id, job_id = %job.id, "structure generation enqueued");
        Ok(document)
    }

    /// Debits the owner before enqueueing unless this is a retry after a
    /// failed stage-2 run. A billing failure leaves the document untouched.
    pub async fn start_full_generation(
        &self,
        document_id: DocumentId,
        billing: &BillingContext,
    ) -> Result<Document, GenerationError> {
        let _claim = self.claim(document_id)?;
        let mut document = self.load(document_id).await?;
        self.ensure_no_active_job(document_id).await?;
        check_full_generation_preconditions(&document)?;

        let free_retry = document.status == DocumentStatus::FullGenerationFailed;
        if free_retry {
            tracing::info!(%document_id, "retrying failed full generation free of charge");
        } else {
            self.ledger
                .debit(
                    &billing.user_id,
                    billing.amount,
                    &format!("full generation for document {document_id}"),
                )
                .await?;
        }

        let prior = document.clone();
        document.status = DocumentStatus::FullGenerating;
        document.error_message = None;
        document.touch();
        if let Err(err) = self.documents.put(&document).await {
            if !free_retry {
                self.refund(document_id, billing).await;
            }
            return Err(err.into());
        }

        let job = GenerationJob::new(JobType::Detailed, document_id);
        if let Err(err) = self.dispatcher.dispatch(&job).await {
            self.restore(&prior).await;
            if !free_retry {
                self.refund(document_id, billing).await;
            }
            return Err(GenerationError::Dispatch(format!("{err:#}")));
        }
        self.guard.invalidate(document_id).await;

        tracing::info!(
            %document_id,
            job_id = %job.id,
            charged = !free_retry,
            "full generation enqueued"
        );
        Ok(document)
    }

    async fn restore(&self, prior: &Document) {
        if let Err(err) = self.documents.put(prior).await {
            tracing::error!(document_id = %prior.id, ?err, "failed to restore document status");
        }
    }

    async fn refund(&self, document_id: DocumentId, billing: &BillingContext) {
        let memo = format!("refund: full generation for document {document_id} was not enqueued");
        if let Err(err) = self
            .ledger
            .credit(&billing.user_id, billing.amount, &memo)
            .await
        {
            tracing::error!(%document_id, user_id = %billing.user_id, error = %err, "refund failed");
        }
    }

    pub async fn safe_start_base_generation(&self, document_id: DocumentId) -> StartResult {
        match self.start_base_generation(document_id).await {
            Ok(_) => StartResult {
                success: true,
                message: "Structure generation started".to_owned(),
            },
            Err(err) => {
                log_refusal(document_id, &err, "structure generation not started");
                StartResult {
                    success: false,
                    message: err.to_string(),
                }
            }
        }
    }

    pub async fn safe_start_full_generation(
        &self,
        document_id: DocumentId,
        billing: &BillingContext,
    ) -> StartResult {
        match self.start_full_generation(document_id, billing).await {
            Ok(_) => StartResult {
                success: true,
                message: "Full generation started".to_owned(),
            },
            Err(err) => {
                log_refusal(document_id, &err, "full generation not started");
                StartResult {
                    success: false,
                    message: err.to_string(),
                }
            }
        }
    }

    pub async fn has_active_job(&self, document_id: DocumentId) -> Result<bool, GenerationError> {
        Ok(self.guard.has_active_job(document_id).await?)
    }

    pub async fn job_status(
        &self,
        document_id: DocumentId,
    ) -> Result<JobStatusReport, GenerationError> {
        Ok(self.guard.job_status(document_id).await?)
    }

    /// Operator cleanup. A document left in a running status has no job to
    /// finish it once its jobs are gone, so it is moved to the stage's failed
    /// status, which opens the regular (and, for stage 2, free) retry path.
    pub async fn delete_jobs(&self, document_id: DocumentId) -> Result<DeletedJobs, GenerationError> {
        let _claim = self.claim(document_id)?;
        let deleted = self.guard.delete_jobs(document_id).await?;

        let Some(mut document) = self.documents.get(document_id).await? else {
            return Ok(deleted);
        };
        let failed = match document.status {
            DocumentStatus::PreGenerating => DocumentStatus::PreGenerationFailed,
            DocumentStatus::FullGenerating => DocumentStatus::FullGenerationFailed,
            _ => return Ok(deleted),
        };
        ensure_transition(document.status, failed)?;
        document.status = failed;
        document.error_message = Some(JOBS_DELETED_MESSAGE.to_owned());
        document.touch();
        self.documents.put(&document).await?;
        tracing::warn!(%document_id, status = %failed, "generation jobs deleted; document marked failed");
        Ok(deleted)
    }

    pub async fn status(&self, document_id: DocumentId) -> Result<StatusReport, GenerationError> {
        let document = self.load(document_id).await?;
        let job = self.guard.job_status(document_id).await?;
        Ok(StatusReport::new(&document, job))
    }
}
