//! OpenAI-compatible chat-completion client
//!
//! The `ChatCompletion` trait is the seam between the summarization pipeline
//! and the generation backend; tests substitute a scripted implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// One role-tagged message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion errors
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no choices in response")]
    EmptyResponse,
}

/// Chat-completion service the pipeline talks to.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Send role-tagged messages and return the generated text.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ChatError>;
}

/// Client for OpenAI-compatible endpoints (LM Studio, vLLM).
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_retries: usize,
}

impl OpenAiChatClient {
    /// Create a new client from backend configuration.
    pub fn new(config: &LlmConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Initialization(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries.max(1),
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ChatError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens,
            temperature: Some(temperature),
        };

        let url = format!("{}/chat/completions", self.base_url);

        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} for chat completion", attempt);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await;

            match response {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status().as_u16();
                        let body = response.text().await.unwrap_or_default();
                        last_error = Some(ChatError::Status { status, body });
                        continue;
                    }

                    match response.json::<ChatCompletionResponse>().await {
                        Ok(parsed) => {
                            return match parsed.choices.first() {
                                Some(choice) => Ok(choice.message.content.trim().to_string()),
                                None => Err(ChatError::EmptyResponse),
                            };
                        }
                        Err(e) => {
                            last_error = Some(ChatError::Malformed(e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(ChatError::Network(e.to_string()));
                }
            }
        }

        warn!("Chat completion failed after {} attempts", self.max_retries);
        Err(last_error.unwrap_or(ChatError::EmptyResponse))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
