use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::models::ChatMessage;
use crate::retry::send_with_retry;
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiChatModel {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &'static str {
        "openai-chat"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let url = self.config.endpoint("chat/completions");
        let body = ChatRequest {
            model: &self.config.chat_model,
            messages: messages
                .iter()
                .map(|message| ApiMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
            temperature: self.config.temperature,
        };

        let started = Instant::now();
        let raw = send_with_retry(self.name(), &self.config.retry, || {
            self.client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
        })
        .await?;
        let parsed: ChatResponse = serde_json::from_str(&raw)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BackendResponse {
                provider: self.name(),
                details: "response has no choices".to_string(),
            })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::ContentPolicy {
                provider: self.name(),
                details: "completion was filtered".to_string(),
            });
        }

        let answer = choice.message.content.unwrap_or_default();
        if answer.trim().is_empty() {
            return Err(ProviderError::BackendResponse {
                provider: self.name(),
                details: "empty completion".to_string(),
            });
        }

        debug!(
            model = %self.config.chat_model,
            messages = messages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat completion received"
        );

        Ok(answer)
    }
}
