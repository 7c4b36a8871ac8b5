//! Boundary to the text-completion service.
//!
//! The conversation layer only needs "system instruction + history + question in, raw text
//! out". Whatever comes back is handed to the interpreter untouched; no attempt is made to
//! coerce the provider into returning valid JSON.

use crate::config::{CompletionProvider, get_config};
use crate::model::Role;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// One prior exchange forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub text: String,
}

/// Everything the provider needs to answer one question.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// System instruction, including the grounding context.
    pub system_instruction: String,
    /// Settled transcript, oldest first.
    pub history: Vec<ChatTurn>,
    /// The operator's new question.
    pub prompt: String,
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the provider's raw reply text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Build a completion client based on configuration; `None` when the provider is disabled.
pub fn get_completion_client() -> Result<Option<Arc<dyn CompletionClient>>, CompletionError> {
    let config = get_config();
    match config.completion_provider {
        CompletionProvider::None => Ok(None),
        CompletionProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Some(Arc::new(OllamaCompletionClient::new(base_url)?)))
        }
    }
}

/// Client for a local Ollama runtime's chat endpoint.
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
}

impl OllamaCompletionClient {
    /// Client talking to the runtime at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent("indicator-desk/completion")
            .build()
            .map_err(|error| CompletionError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaReply,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaReply {
    content: String,
}

fn chat_messages(request: &CompletionRequest) -> Vec<OllamaChatMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(OllamaChatMessage {
        role: "system",
        content: &request.system_instruction,
    });
    messages.extend(request.history.iter().map(|turn| OllamaChatMessage {
        role: match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: &turn.text,
    }));
    messages.push(OllamaChatMessage {
        role: "user",
        content: &request.prompt,
    });
    messages
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let payload = OllamaChatRequest {
            model: &request.model,
            messages: chat_messages(&request),
            stream: false,
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        tracing::debug!(model = %request.model, chars = body.message.content.len(), "Completion received");
        Ok(body.message.content)
    }
}
