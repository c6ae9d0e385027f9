use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::app::model::{GenerationJob, JobType};
use crate::app::runner::JobHandler;
use crate::audit::{AuditLog, GptRequest, GptRequestMetadata, GptRequestStatus};
use crate::document::{
    Document, DocumentId, DocumentStatus, DocumentStore, GptSettings, ResolvedGptSettings,
};
use crate::events::{DomainEvent, EventBus};
use crate::generation::error::{GenerationError, ensure_transition};
use crate::generation::{parse, prompt};
use crate::llm::{LlmRegistry, LlmResponse, RequestOptions};

/// Status triple and backend defaults for one generation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub job_type: JobType,
}

impl Stage {
    pub fn of(job_type: JobType) -> Self {
        Self { job_type }
    }

    pub fn running(self) -> DocumentStatus {
        match self.job_type {
            JobType::Structure => DocumentStatus::PreGenerating,
            JobType::Detailed => DocumentStatus::FullGenerating,
        }
    }

    pub fn done(self) -> DocumentStatus {
        match self.job_type {
            JobType::Structure => DocumentStatus::PreGenerated,
            JobType::Detailed => DocumentStatus::FullGenerated,
        }
    }

    pub fn failed(self) -> DocumentStatus {
        match self.job_type {
            JobType::Structure => DocumentStatus::PreGenerationFailed,
            JobType::Detailed => DocumentStatus::FullGenerationFailed,
        }
    }

    pub fn defaults(self) -> ResolvedGptSettings {
        match self.job_type {
            JobType::Structure => ResolvedGptSettings {
                service: "openai".to_owned(),
                model: "gpt-3.5-turbo".to_owned(),
                temperature: 0.7,
            },
            JobType::Detailed => ResolvedGptSettings {
                service: "openai".to_owned(),
                model: "gpt-4".to_owned(),
                temperature: 0.8,
            },
        }
    }

    /// Whether a job of this stage may (re)enter its running status from
    /// `status`. Stage 2 is normally entered by the orchestrator, so the job
    /// only re-validates.
    fn accepts(self, status: DocumentStatus) -> bool {
        status == self.running() || status.can_transition_to(self.running())
    }

    fn completed_event(self, document_id: DocumentId) -> DomainEvent {
        let at = Utc::now();
        match self.job_type {
            JobType::Structure => DomainEvent::StructureGenerated { document_id, at },
            JobType::Detailed => DomainEvent::FullGenerationCompleted { document_id, at },
        }
    }

    fn failed_event(self, document_id: DocumentId, error: String) -> DomainEvent {
        let at = Utc::now();
        match self.job_type {
            JobType::Structure => DomainEvent::StructureGenerationFailed {
                document_id,
                error,
                at,
            },
            JobType::Detailed => DomainEvent::FullGenerationFailed {
                document_id,
                error,
                at,
            },
        }
    }
}

/// Executes both generation stages inside the worker.
pub struct GenerationPipeline {
    documents: Arc<dyn DocumentStore>,
    llm: LlmRegistry,
    audit: Arc<dyn AuditLog>,
    events: Arc<dyn EventBus>,
}

impl GenerationPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        llm: LlmRegistry,
        audit: Arc<dyn AuditLog>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            documents,
            llm,
            audit,
            events,
        }
    }

    async fn load(&self, document_id: DocumentId) -> Result<Document, GenerationError> {
        self.documents
            .get(document_id)
            .await?
            .ok_or(GenerationError::DocumentNotFound(document_id))
    }

    pub async fn run(&self, stage: Stage, document_id: DocumentId) -> Result<(), GenerationError> {
        let mut document = self.load(document_id).await?;

        // Re-validated inside the job; nothing is mutated when this fails.
        if !stage.accepts(document.status) {
            return Err(GenerationError::InvalidTransition {
                from: document.status,
                to: stage.running(),
            });
        }
        if document.status != stage.running() {
            document.status = stage.running();
            document.touch();
            self.documents.put(&document).await?;
        }

        let settings = GptSettings::resolve(document.gpt_settings.as_ref(), &stage.defaults());
        let prompt = match stage.job_type {
            JobType::Structure => prompt::structure_prompt(&document)?,
            JobType::Detailed => prompt::detailed_prompt(&document)?,
        };

        let mut response = None;
        let outcome = self
            .attempt(stage, &mut document, &settings, &prompt, &mut response)
            .await;

        match outcome {
            Ok(()) => {
                ensure_transition(document.status, stage.done())?;
                document.status = stage.done();
                document.error_message = None;
                document.touch();
                self.documents.put(&document).await?;

                tracing::info!(
                    %document_id,
                    job_type = %stage.job_type,
                    service = %settings.service,
                    model = %settings.model,
                    "generation stage completed"
                );
                self.record(stage, &document, &settings, prompt, response, None)
                    .await;
                self.events.emit(stage.completed_event(document_id)).await;
                Ok(())
            }
            Err(err) => {
                match &err {
                    GenerationError::Llm(llm_err) => tracing::warn!(
                        %document_id,
                        job_type = %stage.job_type,
                        retryable = llm_err.is_retryable(),
                        error = %err,
                        "LLM request failed"
                    ),
                    _ if err.is_output_rejected() => tracing::warn!(
                        %document_id,
                        job_type = %stage.job_type,
                        error = %err,
                        "model output rejected"
                    ),
                    _ => tracing::warn!(
                        %document_id,
                        job_type = %stage.job_type,
                        error = %err,
                        "generation attempt failed"
                    ),
                }

                let message = err.to_string();
                if document.status.can_transition_to(stage.failed()) {
                    document.status = stage.failed();
                }
                document.error_message = Some(message.clone());
                document.touch();
                if let Err(store_err) = self.documents.put(&document).await {
                    tracing::error!(%document_id, ?store_err, "failed to persist failure state");
                }

                self.record(stage, &document, &settings, prompt, response, Some(&message))
                    .await;
                self.events
                    .emit(stage.failed_event(document_id, message))
                    .await;
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        stage: Stage,
        document: &mut Document,
        settings: &ResolvedGptSettings,
        prompt: &str,
        response_slot: &mut Option<LlmResponse>,
    ) -> Result<(), GenerationError> {
        if stage.job_type == JobType::Detailed && !document.has_minimal_structure() {
            return Err(GenerationError::StructureRequired);
        }

        let client = self.llm.get(&settings.service)?;
        let mut options = RequestOptions::new(settings.model.clone(), settings.temperature);
        options.system_prompt = Some(prompt::SYSTEM_PROMPT.to_owned());
        options.thread_id = document.thread_id.clone();

        let response = response_slot.insert(client.send_request(prompt, &options).await?);
        if let Some(thread_id) = response.thread_id.as_ref() {
            document.thread_id = Some(thread_id.clone());
        }

        match stage.job_type {
            JobType::Structure => {
                parse::parse_structure_response(&response.content)?.apply(&mut document.structure)
            }
            JobType::Detailed => {
                parse::parse_detailed_response(&response.content)?.apply(&mut document.structure)
            }
        }
        Ok(())
    }

    async fn record(
        &self,
        stage: Stage,
        document: &Document,
        settings: &ResolvedGptSettings,
        prompt: String,
        response: Option<LlmResponse>,
        error: Option<&str>,
    ) {
        let request = GptRequest {
            id: uuid::Uuid::new_v4(),
            document_id: document.id,
            prompt,
            status: if error.is_some() {
                GptRequestStatus::Failed
            } else {
                GptRequestStatus::Completed
            },
            error_message: error.map(str::to_owned),
            metadata: GptRequestMetadata {
                service: settings.service.clone(),
                model: response
                    .as_ref()
                    .map(|r| r.model.clone())
                    .unwrap_or_else(|| settings.model.clone()),
                tokens_used: response.as_ref().map_or(0, |r| r.tokens_used),
                generation_type: stage.job_type,
            },
            response: response.map(|r| r.content),
            created_at: Utc::now(),
        };
        if let Err(err) = self.audit.record(&request).await {
            tracing::error!(document_id = %document.id, ?err, "failed to write gpt request audit record");
        }
    }

    /// Terminal hook: re-asserts the stage's failed status unless the
    /// document has already moved somewhere the lifecycle forbids leaving.
    pub async fn mark_failed(&self, stage: Stage, document_id: DocumentId, error: &str) {
        let mut document = match self.load(document_id).await {
            Ok(document) => document,
            Err(err) => {
                tracing::error!(%document_id, error = %err, "failed hook could not load document");
                return;
            }
        };

        let failed = stage.failed();
        if document.status != failed && !document.status.can_transition_to(failed) {
            tracing::warn!(
                %document_id,
                status = %document.status,
                "document left a generating state; not marking failed"
            );
            return;
        }

        document.status = failed;
        document.error_message = Some(error.to_owned());
        document.touch();
        if let Err(err) = self.documents.put(&document).await {
            tracing::error!(%document_id, ?err, "failed hook could not persist document");
        }
    }
}

#[async_trait]
impl JobHandler for GenerationPipeline {
    async fn handle(&self, job: &GenerationJob) -> anyhow::Result<()> {
        self.run(Stage::of(job.job_type), job.document_id).await?;
        Ok(())
    }

    async fn failed(&self, job: &GenerationJob, error: &str) {
        tracing::error!(
            job_id = %job.id,
            document_id = %job.document_id,
            job_type = %job.job_type,
            attempts = job.attempts,
            error,
            "generation failed after exhausting retries"
        );
        self.mark_failed(Stage::of(job.job_type), job.document_id, error)
            .await;
    }
}
