use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::llm::openai::{OpenAiAssistantClient, OpenAiChatClient};
use crate::llm::thread::{PollSchedule, ThreadRunBackend};
use crate::llm::{LlmClient, LlmError};

pub const OPENAI_SERVICE: &str = "openai";
pub const OPENAI_ASSISTANT_SERVICE: &str = "openai_assistant";

/// Resolves `gpt_settings.service` to a backend.
#[derive(Clone, Default)]
pub struct LlmRegistry {
    clients: HashMap<String, Arc<dyn LlmClient>>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(
            OPENAI_SERVICE,
            Arc::new(OpenAiChatClient::new(
                http.clone(),
                config.openai_base_url.clone(),
                config.openai_api_key.clone(),
            )),
        );
        if let Some(assistant_id) = config.openai_assistant_id.as_deref() {
            let client = OpenAiAssistantClient::new(
                http,
                config.openai_base_url.clone(),
                config.openai_api_key.clone(),
                assistant_id,
            );
            registry.register(
                OPENAI_ASSISTANT_SERVICE,
                Arc::new(ThreadRunBackend::new(client, PollSchedule::default())),
            );
        }
        registry
    }

    pub fn register(&mut self, service: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.clients.insert(service.into(), client);
    }

    pub fn get(&self, service: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        self.clients
            .get(service)
            .cloned()
            .ok_or_else(|| LlmError::UnknownService(service.to_owned()))
    }

    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
