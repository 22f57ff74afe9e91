//! Anthropic HTTP client

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use storesql_core::error::StoreSqlError;

use super::types::ApiError;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `base_url` - API root, e.g. `https://api.anthropic.com/v1`
    /// * `timeout` - Whole-request timeout
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreSqlError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreSqlError::llm(PROVIDER, format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `endpoint` and decode the JSON response.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Res, StoreSqlError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "Sending model request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| StoreSqlError::llm(PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| StoreSqlError::llm(PROVIDER, format!("Failed to parse response: {}", e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(status_error(status, &error_text))
        }
    }
}

/// Map a non-success status and body to an error.
pub(crate) fn status_error(status: StatusCode, body: &str) -> StoreSqlError {
    let message = match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => api_error.error.message,
        Err(_) => body.to_string(),
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => StoreSqlError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreSqlError::InvalidApiKey {
            provider: PROVIDER.to_string(),
        },
        _ => StoreSqlError::llm(PROVIDER, format!("{}: {}", status.as_u16(), message)),
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
