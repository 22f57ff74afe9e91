//! [`LanguageModel`] implementation backed by the Messages API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use storesql_core::config::LlmConfig;
use storesql_core::error::StoreSqlError;

use super::client::AnthropicClient;
use super::types::{MessageRequest, MessageResponse};
use crate::provider::LanguageModel;
use crate::types::{ModelReply, ModelRequest};

/// Claude model with fixed generation settings.
#[derive(Debug)]
pub struct AnthropicModel {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnthropicModel {
    pub fn new(client: AnthropicClient, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build from configuration, reading the key from `config.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, StoreSqlError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            StoreSqlError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        let client = AnthropicClient::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, config.model.clone(), config.max_tokens)
            .with_temperature(config.temperature))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_wire(&self, request: ModelRequest) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            messages: request.messages,
            max_tokens: self.max_tokens,
            system: Some(request.system).filter(|s| !s.is_empty()),
            temperature: self.temperature,
            tools: request.tools,
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, StoreSqlError> {
        let body = self.to_wire(request);
        let response: MessageResponse = self.client.request("messages", &body).await?;
        debug!(
            id = %response.id,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Model replied"
        );
        Ok(ModelReply {
            content: response.content,
            stop_reason: response.stop_reason,
        })
    }
}
