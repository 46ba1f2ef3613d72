use super::{extract_chat_content, status_error, transport_error, ChatProvider, Message, Result};
use crate::config::OpenAIConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use sdk::errors::InvocationError;
use serde_json::json;

/// OpenAI-compatible `/chat/completions` provider
pub struct OpenAIProvider {
    config: OpenAIConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, api_key: SecretString) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/models", self.config.base_url);
        match self
            .client
            .get(&url)
            .bearer_auth(self.api_key.unsecure())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.config.model,
            "messages": api_messages,
        });

        tracing::debug!(
            "OpenAI request: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.unsecure()))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(e, "OpenAI", &self.config.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InvocationError::MalformedResponse(e.to_string()))?;

        extract_chat_content(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_properties() {
        let provider = OpenAIProvider::new(OpenAIConfig::default(), SecretString::new("sk-test"));
        assert_eq!(provider.name(), "openai");
        assert!(!provider.is_local());
    }
}
