use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::document::DocumentId;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    StructureGenerated {
        document_id: DocumentId,
        at: DateTime<Utc>,
    },
    StructureGenerationFailed {
        document_id: DocumentId,
        error: String,
        at: DateTime<Utc>,
    },
    FullGenerationCompleted {
        document_id: DocumentId,
        at: DateTime<Utc>,
    },
    FullGenerationFailed {
        document_id: DocumentId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::StructureGenerated { .. } => "structure_generated",
            DomainEvent::StructureGenerationFailed { .. } => "structure_generation_failed",
            DomainEvent::FullGenerationCompleted { .. } => "full_generation_completed",
            DomainEvent::FullGenerationFailed { .. } => "full_generation_failed",
        }
    }

    pub fn document_id(&self) -> DocumentId {
        match self {
            DomainEvent::StructureGenerated { document_id, .. }
            | DomainEvent::StructureGenerationFailed { document_id, .. }
            | DomainEvent::FullGenerationCompleted { document_id, .. }
            | DomainEvent::FullGenerationFailed { document_id, .. } => *document_id,
        }
    }
}

/// Fire-and-forget notification sink. Emitting never fails the caller.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn emit(&self, event: DomainEvent);
}

#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn emit(&self, event: DomainEvent) {
        tracing::info!(
            event = event.name(),
            document_id = %event.document_id(),
            "domain event"
        );
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
