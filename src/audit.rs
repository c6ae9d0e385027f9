use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Mutex;

use crate::app::model::JobType;
use crate::document::DocumentId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GptRequestStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GptRequestMetadata {
    pub service: String,
    pub model: String,
    pub tokens_used: u64,
    pub generation_type: JobType,
}

/// One LLM round trip, recorded after a stage completes or fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GptRequest {
    pub id: uuid::Uuid,
    pub document_id: DocumentId,
    pub prompt: String,
    #[serde(default)]
    pub response: Option<String>,
    pub status: GptRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub metadata: GptRequestMetadata,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, request: &GptRequest) -> anyhow::Result<()>;
    async fn for_document(&self, document_id: DocumentId) -> anyhow::Result<Vec<GptRequest>>;
}

/// Append-only `gpt_requests.jsonl`.
#[derive(Debug)]
pub struct LocalFsAuditLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl LocalFsAuditLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: base_dir.into().join("gpt_requests.jsonl"),
            append_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditLog for LocalFsAuditLog {
    async fn record(&self, request: &GptRequest) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(request).context("serialize gpt request")?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create parent dir: {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("append: {}", self.path.display()))?;
        file.flush().await.context("flush audit log")?;
        Ok(())
    }

    async fn for_document(&self, document_id: DocumentId) -> anyhow::Result<Vec<GptRequest>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read: {}", self.path.display()));
            }
        };

        let mut requests = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let request: GptRequest = serde_json::from_str(line)
                .with_context(|| format!("parse gpt_requests.jsonl line {}", idx + 1))?;
            if request.document_id == document_id {
                requests.push(request);
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(document_id: DocumentId, status: GptRequestStatus) -> GptRequest {
        GptRequest {
            id: uuid::Uuid::new_v4(),
            document_id,
            prompt: "outline please".to_owned(),
            response: Some("{}".to_owned()),
            status,
            error_message: None,
            metadata: GptRequestMetadata {
                service: "openai".to_owned(),
                model: "gpt-3.5-turbo".to_owned(),
                tokens_used: 12,
                generation_type: JobType::Structure,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_are_appended_and_filtered_by_document() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let log = LocalFsAuditLog::new(temp.path());
        let doc = uuid::Uuid::new_v4();

        log.record(&request(doc, GptRequestStatus::Completed)).await?;
        log.record(&request(uuid::Uuid::new_v4(), GptRequestStatus::Completed))
            .await?;
        log.record(&request(doc, GptRequestStatus::Failed)).await?;

        let records = log.for_document(doc).await?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, GptRequestStatus::Failed);

        let raw = std::fs::read_to_string(temp.path().join("gpt_requests.jsonl"))?;
        assert_eq!(raw.lines().count(), 3);
        Ok(())
    }
}
