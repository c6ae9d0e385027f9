pub mod openai;
pub mod registry;
pub mod thread;

use async_trait::async_trait;
use serde::Serialize;

pub use registry::LlmRegistry;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("LLM API error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("LLM API rate limited: {message}")]
    RateLimited { message: String },
    #[error("malformed LLM response: {0}")]
    Malformed(String),
    #[error("run {run_id} ended with status `{status}`{}", reason_suffix(.message))]
    RunFailed {
        run_id: String,
        status: String,
        message: Option<String>,
    },
    #[error("run {run_id} did not complete after {attempts} polls ({elapsed_secs}s)")]
    RunTimeout {
        run_id: String,
        attempts: u32,
        elapsed_secs: u64,
    },
    #[error("unknown LLM service: {0}")]
    UnknownService(String),
    #[error("LLM backend is not configured: {0}")]
    NotConfigured(String),
}

fn reason_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

impl LlmError {
    /// Network trouble, non-success HTTP statuses, rate limiting and run
    /// timeouts. Everything else points at the payload or the setup.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Transport { .. }
                | LlmError::Http { .. }
                | LlmError::RateLimited { .. }
                | LlmError::RunTimeout { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    /// Existing conversation to continue on thread/run backends.
    pub thread_id: Option<String>,
}

impl RequestOptions {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            system_prompt: None,
            thread_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send_request(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<LlmResponse, LlmError>;
}
