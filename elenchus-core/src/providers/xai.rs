//! xAI (Grok) provider, an OpenAI-compatible endpoint at api.x.ai

use async_trait::async_trait;
use std::time::Duration;

use super::openai::wire;
use super::retry::{with_retry, RetryConfig};
use super::{
    GenerateRequest, ModelProvider, ModelReply, ProviderError, DEFAULT_REQUEST_TIMEOUT,
};

const XAI_BASE_URL: &str = "https://api.x.ai/v1";

/// xAI Grok provider. Speaks the OpenAI chat-completions wire format and
/// passes the seed through.
pub struct XaiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl XaiProvider {
    /// Create from `XAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("XAI_API_KEY")
            .map_err(|_| ProviderError::NotConfigured("XAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: XAI_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ModelProvider for XaiProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
        let wire_request = wire::ChatRequest {
            model: self.model.clone(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            seed: request.seed,
            stop: request.stop.clone(),
        };
        let url = format!("{}/chat/completions", self.base_url);

        let (response, latency_ms) = with_retry(&self.retry, || {
            wire::execute(
                &self.client,
                &url,
                &self.api_key,
                &[],
                &wire_request,
                self.timeout,
                self.provider_name(),
            )
        })
        .await?;

        Ok(ModelReply {
            content: wire::reply_content(&response)?,
            model_identifier: response.model.clone().unwrap_or_else(|| self.model.clone()),
            tokens_used: wire::reply_usage(&response),
            latency_ms,
            seed_applied: request.seed,
        })
    }

    fn provider_name(&self) -> &str {
        "xai"
    }

    fn model_identifier(&self) -> String {
        self.model.clone()
    }

    fn supports_seed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name() {
        let provider = XaiProvider::new("k", "grok-3");
        assert_eq!(provider.provider_name(), "xai");
        assert!(provider.supports_seed());
    }
}
