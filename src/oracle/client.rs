//! Chat-completions client for the diagnostic oracle
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (DeepSeek by
//! default; a local Ollama works through its `/v1` prefix).

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parse::parse_payload;
use super::prompt::{build_user_prompt, Phase, DIAGNOSTIC_SYSTEM_PROMPT};
use super::{Oracle, OracleError};
use crate::config::OracleConfig;
use crate::diagnostic::{DiagnosticRequest, DiagnosticTurn};

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant"
    #[serde(default)]
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

/// Body of a chat-completions request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Reply from `/chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct ChatCompletionsClient {
    config: OracleConfig,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    /// Create a new client from oracle settings
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Assemble the request body for one round
    pub fn build_request(&self, request: &DiagnosticRequest) -> CompletionRequest {
        let phase = Phase::of(request);
        CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(DIAGNOSTIC_SYSTEM_PROMPT),
                ChatMessage::user(build_user_prompt(request)),
            ],
            max_tokens: self.config.token_budget.for_phase(phase),
            stream: false,
            temperature: self.config.temperature,
        }
    }

    /// Send a completion request and return the assistant's raw text
    pub async fn complete(&self, body: &CompletionRequest) -> Result<String, OracleError> {
        let endpoint = format!("{}/chat/completions", self.config.base_url);

        let mut request = self.client.post(&endpoint).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let completion: CompletionResponse =
            serde_json::from_str(&text).map_err(OracleError::Envelope)?;

        if let Some(usage) = completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Oracle token usage"
            );
        }

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

#[async_trait]
impl Oracle for ChatCompletionsClient {
    async fn diagnose(&self, request: &DiagnosticRequest) -> Result<DiagnosticTurn, OracleError> {
        let body = self.build_request(request);
        let raw = self.complete(&body).await?;
        let payload = parse_payload(&raw)?;
        Ok(payload.into_turn(request.iteration, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_build_request_phases() {
        let client = ChatCompletionsClient::new(OracleConfig::default());

        let initial = client.build_request(&DiagnosticRequest::initial("High CPU usage", HashMap::new()));
        assert_eq!(initial.model, "deepseek-chat");
        assert_eq!(initial.max_tokens, 500);
        assert_eq!(initial.messages.len(), 2);
        assert_eq!(initial.messages[0].role, "system");
        assert_eq!(initial.messages[1].role, "user");
        assert!(!initial.stream);

        let follow_up = client.build_request(&DiagnosticRequest::follow_up("High CPU usage", vec![], 1));
        assert_eq!(follow_up.max_tokens, 2048);
    }

    #[test]
    fn test_request_serialization_skips_unset_temperature() {
        let client = ChatCompletionsClient::new(OracleConfig::default());
        let body = client.build_request(&DiagnosticRequest::initial("x", HashMap::new()));
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"max_tokens\":500"));
        assert!(!json.contains("temperature"));
    }
}
