use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::llm::thread::{RunState, ThreadClient, ThreadMessage};
use crate::llm::{LlmClient, LlmError, LlmResponse, RequestOptions};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn endpoint(base_url: &str, path: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/{}", path.trim_start_matches('/'))
}

/// Sends a prepared request and returns the decoded JSON body, mapping
/// non-success statuses onto `LlmError`.
async fn send_json(request: reqwest::RequestBuilder, endpoint: &str) -> Result<Value, LlmError> {
    let response = request.send().await.map_err(|source| LlmError::Transport {
        endpoint: endpoint.to_owned(),
        source,
    })?;

    let status = response.status();
    let raw = response.text().await.map_err(|source| LlmError::Transport {
        endpoint: endpoint.to_owned(),
        source,
    })?;

    if status == StatusCode::TOO_MANY_REQUESTS {
        let message = parse_error_message(&raw).unwrap_or(raw);
        return Err(LlmError::RateLimited { message });
    }
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or(raw);
        return Err(LlmError::Http {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&raw)
        .map_err(|err| LlmError::Malformed(format!("response body is not JSON: {err}")))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn require_api_key(api_key: Option<&str>) -> Result<&str, LlmError> {
    api_key
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY is not set".to_owned()))
}

fn str_field(value: &Value, pointer: &str) -> Result<String, LlmError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| LlmError::Malformed(format!("missing `{pointer}` in response")))
}

/// Chat completions backend (`POST /chat/completions`).
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn send_request(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<LlmResponse, LlmError> {
        let api_key = require_api_key(self.api_key.as_deref())?;
        let endpoint = endpoint(&self.base_url, "chat/completions");

        let mut messages = Vec::new();
        if let Some(system) = options.system_prompt.as_deref() {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        let mut body = serde_json::json!({
            "model": options.model,
            "messages": messages,
        });

        // NOTE: Some GPT-5 models reject sampling params like `temperature`.
        if !options.model.starts_with("gpt-5")
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("temperature".to_owned(), serde_json::json!(options.temperature));
        }

        tracing::debug!(model = %options.model, endpoint = %endpoint, "chat completion request");
        let value = send_json(
            self.client.post(&endpoint).bearer_auth(api_key).json(&body),
            &endpoint,
        )
        .await?;

        let content = str_field(&value, "/choices/0/message/content")?;
        if content.trim().is_empty() {
            return Err(LlmError::Malformed("completion content is empty".to_owned()));
        }
        let tokens_used = value
            .pointer("/usage/total_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let model = value
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(options.model.as_str())
            .to_owned();

        Ok(LlmResponse {
            content,
            tokens_used,
            model,
            thread_id: None,
        })
    }
}

/// Assistants backend: conversations live in server-side threads and
/// generation happens in runs that must be polled.
#[derive(Debug, Clone)]
pub struct OpenAiAssistantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    assistant_id: String,
}

impl OpenAiAssistantClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            assistant_id: assistant_id.into(),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<(reqwest::RequestBuilder, String), LlmError> {
        let api_key = require_api_key(self.api_key.as_deref())?;
        let endpoint = endpoint(&self.base_url, path);
        let request = self
            .client
            .request(method, &endpoint)
            .bearer_auth(api_key)
            .header("OpenAI-Beta", "assistants=v2");
        Ok((request, endpoint))
    }
}

fn run_state(value: &Value) -> Result<RunState, LlmError> {
    Ok(RunState {
        id: str_field(value, "/id")?,
        status: str_field(value, "/status")?,
        tokens_used: value.pointer("/usage/total_tokens").and_then(Value::as_u64),
        model: value.get("model").and_then(Value::as_str).map(str::to_owned),
        error_message: value
            .pointer("/last_error/message")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

#[async_trait]
impl ThreadClient for OpenAiAssistantClient {
    async fn create_thread(&self) -> Result<String, LlmError> {
        let (request, endpoint) = self.request(reqwest::Method::POST, "threads")?;
        let value = send_json(request.json(&serde_json::json!({})), &endpoint).await?;
        str_field(&value, "/id")
    }

    async fn add_message_to_thread(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), LlmError> {
        let (request, endpoint) = self.request(
            reqwest::Method::POST,
            &format!("threads/{thread_id}/messages"),
        )?;
        let body = serde_json::json!({ "role": "user", "content": content });
        send_json(request.json(&body), &endpoint).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        options: &RequestOptions,
    ) -> Result<RunState, LlmError> {
        let (request, endpoint) =
            self.request(reqwest::Method::POST, &format!("threads/{thread_id}/runs"))?;
        let mut body = serde_json::json!({
            "assistant_id": self.assistant_id,
            "model": options.model,
            "temperature": options.temperature,
        });
        if let Some(system) = options.system_prompt.as_deref()
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("instructions".to_owned(), serde_json::json!(system));
        }
        let value = send_json(request.json(&body), &endpoint).await?;
        run_state(&value)
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<RunState, LlmError> {
        let (request, endpoint) = self.request(
            reqwest::Method::GET,
            &format!("threads/{thread_id}/runs/{run_id}"),
        )?;
        let value = send_json(request, &endpoint).await?;
        run_state(&value)
    }

    async fn get_thread_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, LlmError> {
        let (request, endpoint) = self.request(
            reqwest::Method::GET,
            &format!("threads/{thread_id}/messages?order=desc&limit=20"),
        )?;
        let value = send_json(request, &endpoint).await?;
        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::Malformed("missing `data` array in messages".to_owned()))?;

        let mut messages = Vec::new();
        for item in data {
            let role = item
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let mut text = String::new();
            for part in item
                .get("content")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if part.get("type").and_then(Value::as_str) != Some("text") {
                    continue;
                }
                if let Some(value) = part.pointer("/text/value").and_then(Value::as_str) {
                    text.push_str(value);
                }
            }
            messages.push(ThreadMessage { role, text });
        }
        Ok(messages)
    }
}
