//! Chat-completions client seam.
//!
//! One request per synthesized job: a system message, a user message,
//! temperature 0.3. Any failure maps to `ModelFailed` and leaves the
//! job untouched for the next tick.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

pub const TEMPERATURE: f32 = 0.3;

#[async_trait]
pub trait CommandModel: Send + Sync {
    /// Returns the assistant's raw text for a two-message conversation.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat endpoint.
pub struct OpenAiModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl CommandModel for OpenAiModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| WorkerError::ModelFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::ModelFailed(format!(
                "{status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| WorkerError::ModelFailed(format!("malformed response: {err}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| WorkerError::ModelFailed("empty response".to_string()))
    }
}

/// Deterministic model for tests: responses are queued and consumed in
/// order, prompts are recorded for assertions.
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    pub struct MockModel {
        responses: Arc<Mutex<VecDeque<Result<String>>>>,
        prompts: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl MockModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_response(&self, text: impl Into<String>) {
            self.responses.lock().unwrap().push_back(Ok(text.into()));
        }

        pub fn queue_failure(&self, reason: impl Into<String>) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(WorkerError::ModelFailed(reason.into())));
        }

        pub fn prompts(&self) -> Vec<(String, String)> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandModel for MockModel {
        async fn complete(&self, system: &str, user: &str) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(WorkerError::ModelFailed("no response queued".into())))
        }
    }
}
