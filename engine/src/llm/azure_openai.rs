//! Azure OpenAI provider
//!
//! Calls a chat deployment at
//! `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=..`
//! and authenticates with the `api-key` header. The response body has the
//! same shape as OpenAI's.

use super::{extract_chat_content, status_error, transport_error, ChatProvider, Message, Result};
use crate::config::AzureOpenAIConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use sdk::errors::InvocationError;
use serde_json::json;

pub struct AzureOpenAIProvider {
    config: AzureOpenAIConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl AzureOpenAIProvider {
    pub fn new(config: AzureOpenAIConfig, api_key: SecretString) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint(),
            self.config.deployment,
            self.config.api_version
        )
    }
}

#[async_trait]
impl ChatProvider for AzureOpenAIProvider {
    fn name(&self) -> &str {
        "azure_openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn check_health(&self) -> bool {
        let url = format!(
            "{}/openai/models?api-version={}",
            self.endpoint(),
            self.config.api_version
        );
        match self
            .client
            .get(&url)
            .header("api-key", self.api_key.unsecure())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({ "messages": api_messages });

        tracing::debug!(
            "Azure OpenAI request: deployment={}, messages={}",
            self.config.deployment,
            messages.len()
        );

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", self.api_key.unsecure())
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(e, "Azure OpenAI", self.endpoint()))?;

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
