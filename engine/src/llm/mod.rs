//! Chat-completion provider abstraction
//!
//! Personas talk to a hosted (or local) chat-completion service through the
//! [`ChatProvider`] trait. Three providers are supported: an OpenAI-compatible
//! API, Azure OpenAI deployments, and a local Ollama daemon. Each provider
//! makes exactly one HTTP call per `generate` and maps every failure onto
//! [`InvocationError`]; retries and timeouts belong to the caller.

use async_trait::async_trait;
use sdk::errors::{EngineError, InvocationError};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::LLMConfig;
use crate::secrets;

pub mod azure_openai;
pub mod ollama;
pub mod openai;

pub use azure_openai::AzureOpenAIProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, InvocationError>;

/// Message sent to a chat-completion endpoint
///
/// Every invocation is a single user message: the rendered persona template
/// already carries the instructions and the prior turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// Provider trait that all chat-completion backends implement
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name as used in config (`openai`, `azure_openai`, `ollama`)
    fn name(&self) -> &str;

    /// Whether the model runs on this machine. Queries sent to a hosted
    /// model leave the machine.
    fn is_local(&self) -> bool;

    /// Send `messages` and return the assistant's text.
    ///
    /// Performs one network call. Never retries.
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Cheap reachability check used by `legal-mind status`
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the provider selected by `config.provider`.
///
/// # Errors
///
/// `EngineError::Config` for an unknown provider name, a missing API key
/// environment variable, or an Azure provider without an endpoint.
pub fn build_provider(config: &LLMConfig) -> std::result::Result<Box<dyn ChatProvider>, EngineError> {
    match config.provider.as_str() {
        "openai" => {
            let key = secrets::api_key_from_env(&config.openai.api_key_env)?;
            Ok(Box::new(OpenAIProvider::new(config.openai.clone(), key)))
        }
        "azure_openai" => {
            if config.azure_openai.endpoint.trim().is_empty() {
                return Err(EngineError::Config(
                    "llm.azure_openai.endpoint must be set".to_string(),
                ));
            }
            let key = secrets::api_key_from_env(&config.azure_openai.api_key_env)?;
            Ok(Box::new(AzureOpenAIProvider::new(
                config.azure_openai.clone(),
                key,
            )))
        }
        "ollama" => Ok(Box::new(OllamaProvider::new(
            &config.ollama.base_url,
            &config.ollama.model,
        ))),
        other => Err(EngineError::Config(format!("Unknown provider '{}'", other))),
    }
}

/// Map a reqwest transport failure onto the invocation taxonomy.
pub(crate) fn transport_error(e: reqwest::Error, provider: &str, base_url: &str) -> InvocationError {
    if e.is_connect() {
        InvocationError::Unavailable(format!("Cannot connect to {} at {}", provider, base_url))
    } else {
        InvocationError::Network(secrets::scrub(&e.to_string()))
    }
}

/// Map a non-success HTTP status onto the invocation taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> InvocationError {
    let body = secrets::scrub(body);
    match status.as_u16() {
        401 | 403 => InvocationError::Authentication(body),
        429 => InvocationError::RateLimited(body),
        code => InvocationError::Provider {
            status: code,
            message: body,
        },
    }
}

/// Pull `choices[0].message.content` out of an OpenAI-style response body.
pub(crate) fn extract_chat_content(data: &serde_json::Value) -> Result<String> {
    let choice = data
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| InvocationError::MalformedResponse("No choices in response".to_string()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| InvocationError::MalformedResponse("No message in choice".to_string()))?;

    match message.get("content").and_then(|c| c.as_str()) {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(InvocationError::MalformedResponse("Empty content".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.role.to_string(), "user");
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(Message::user("Hi")).unwrap();
        assert_eq!(json, json!({"role": "user", "content": "Hi"}));
    }

    #[test]
    fn test_extract_chat_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Answer"}}]});
        assert_eq!(extract_chat_content(&body).unwrap(), "Answer");

        let empty = json!({"choices": []});
        assert!(matches!(
            extract_chat_content(&empty),
            Err(InvocationError::MalformedResponse(_))
        ));

        let blank = json!({"choices": [{"message": {"content": "  "}}]});
        assert!(extract_chat_content(&blank).is_err());
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "no"),
            InvocationError::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            InvocationError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "down"),
            InvocationError::Provider { status: 502, .. }
        ));
    }

    #[test]
    fn test_status_error_scrubs_body() {
        let err = status_error(
            reqwest::StatusCode::UNAUTHORIZED,
            "Incorrect API key provided: sk-abcdefghijklmnopqrstuvwxyz",
        );
        assert!(!err.to_string().contains("sk-abcdef"));
    }

    #[test]
    fn test_build_ollama_needs_no_key() {
        let mut config = Config::default_config().llm;
        config.provider = "ollama".to_string();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.is_local());
    }

    #[test]
    fn test_build_azure_requires_endpoint() {
        let mut config = Config::default_config().llm;
        config.provider = "azure_openai".to_string();
        assert!(matches!(
            build_provider(&config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_build_openai_requires_key_env() {
        let mut config = Config::default_config().llm;
        config.openai.api_key_env = "LEGAL_MIND_UNSET_OPENAI_KEY".to_string();
        assert!(build_provider(&config).is_err());
    }
}
