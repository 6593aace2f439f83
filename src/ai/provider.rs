//! Chat completion providers
//!
//! Only the OpenAI-compatible HTTP API is implemented. The base URL is
//! configurable so any compatible endpoint can stand in for it.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Speaker of an earlier conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn parse(role: &str) -> Option<Self> {
        match role.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// A system prompt, optional earlier turns, then the new user message
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub history: Vec<ChatTurn>,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ProviderResponse, ProviderError>;

    /// Cheap authenticated call used to check a key
    async fn validate_connection(&self) -> Result<(), ProviderError>;

    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

pub struct OpenAIProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn openai_messages(request: &ChatRequest) -> Vec<OpenAIMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(OpenAIMessage {
        role: "system",
        content: &request.system,
    });
    messages.extend(request.history.iter().map(|turn| OpenAIMessage {
        role: turn.role.as_str(),
        content: &turn.content,
    }));
    messages.push(OpenAIMessage {
        role: "user",
        content: &request.user,
    });
    messages
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = OpenAIRequest {
            model: &request.model,
            messages: openai_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::ModelError(format!(
                "HTTP {}: {}",
                status,
                response.text().await?
            )));
        }

        let parsed: OpenAIResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn validate_connection(&self) -> Result<(), ProviderError> {
        let models = self.list_models().await?;
        if models.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Provider returned no models".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }
        if !response.status().is_success() {
            return Err(ProviderError::ConnectionError(format!(
                "Failed to reach provider: HTTP {}",
                response.status()
            )));
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(ChatRole::parse(" Assistant"), Some(ChatRole::Assistant));
        assert_eq!(ChatRole::parse("user"), Some(ChatRole::User));
        assert_eq!(ChatRole::parse("system"), None);
    }

    #[test]
    fn test_history_sits_between_system_and_message() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo".into(),
            system: "sys".into(),
            history: vec![
                ChatTurn {
                    role: ChatRole::User,
                    content: "hi".into(),
                },
                ChatTurn {
                    role: ChatRole::Assistant,
                    content: "hello".into(),
                },
            ],
            user: "next".into(),
            temperature: 0.7,
            max_tokens: None,
        };

        let roles: Vec<_> = openai_messages(&request)
            .iter()
            .map(|m| (m.role, m.content))
            .collect();
        assert_eq!(
            roles,
            vec![
                ("system", "sys"),
                ("user", "hi"),
                ("assistant", "hello"),
                ("user", "next"),
            ]
        );
    }
}
