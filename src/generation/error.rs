use crate::billing::BillingError;
use crate::document::{DocumentId, DocumentStatus};
use crate::llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),
    #[error("a generation job is already active for document {0}")]
    DuplicateJob(DocumentId),
    #[error("cannot move document from `{from}` to `{to}`")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },
    #[error("document has no objectives and outline yet; generate the structure first")]
    StructureRequired,
    #[error("references are required before full generation can start")]
    ReferencesRequired,
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to parse model output: {0}")]
    Parse(String),
    #[error("model output failed validation: {0}")]
    Validation(String),
    #[error("failed to dispatch generation job: {0}")]
    Dispatch(String),
    #[error("{0:#}")]
    Store(#[from] anyhow::Error),
}

impl GenerationError {
    /// Rejected synchronously at enqueue time; never retried.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            GenerationError::DocumentNotFound(_)
                | GenerationError::DuplicateJob(_)
                | GenerationError::InvalidTransition { .. }
                | GenerationError::StructureRequired
                | GenerationError::ReferencesRequired
                | GenerationError::Billing(_)
        )
    }

    /// The model answered but its output was unusable.
    pub fn is_output_rejected(&self) -> bool {
        matches!(
            self,
            GenerationError::Parse(_) | GenerationError::Validation(_)
        )
    }
}

/// Checks the edge against the lifecycle table before mutating.
pub fn ensure_transition(from: DocumentStatus, to: DocumentStatus) -> Result<(), GenerationError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(GenerationError::InvalidTransition { from, to })
    }
}
