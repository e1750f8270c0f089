//! OpenRouter provider: unified access to many models behind one key
//!
//! Model names take the "provider/model" form, e.g.
//! "anthropic/claude-sonnet-4-5" or "openai/gpt-4-turbo".

use async_trait::async_trait;
use std::time::Duration;

use super::openai::wire;
use super::retry::{with_retry, RetryConfig};
use super::{
    seed_flagged_identifier, GenerateRequest, ModelProvider, ModelReply, ProviderError,
    DEFAULT_REQUEST_TIMEOUT,
};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter provider. OpenAI-compatible wire format plus attribution
/// headers for the OpenRouter dashboard. Seed support depends on the
/// underlying model; only the OpenAI family honors it reliably.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    app_name: String,
    site_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl OpenRouterProvider {
    /// Create from `OPENROUTER_API_KEY`. `OPENROUTER_APP_NAME` and
    /// `OPENROUTER_SITE_URL` feed the attribution headers when set.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ProviderError::NotConfigured("OPENROUTER_API_KEY not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            app_name: std::env::var("OPENROUTER_APP_NAME")
                .unwrap_or_else(|_| "elenchus".to_string()),
            site_url: std::env::var("OPENROUTER_SITE_URL").unwrap_or_default(),
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
impl ModelProvider for OpenRouterProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
        let wire_request = wire::ChatRequest {
            model: self.model.clone(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            seed: if self.supports_seed() { request.seed } else { None },
            stop: request.stop.clone(),
        };
        let url = format!("{}/chat/completions", self.base_url);
        let headers = [
            ("HTTP-Referer", self.site_url.clone()),
            ("X-Title", self.app_name.clone()),
        ];

        let (response, latency_ms) = with_retry(&self.retry, || {
            wire::execute(
                &self.client,
                &url,
                &self.api_key,
                &headers,
                &wire_request,
                self.timeout,
                self.provider_name(),
            )
        })
        .await?;

        let identifier = response.model.clone().unwrap_or_else(|| self.model.clone());
        Ok(ModelReply {
            content: wire::reply_content(&response)?,
            model_identifier: seed_flagged_identifier(
                &identifier,
                request.seed.is_some(),
                self.supports_seed(),
            ),
            tokens_used: wire::reply_usage(&response),
            latency_ms,
            seed_applied: if self.supports_seed() { request.seed } else { None },
        })
    }

    fn provider_name(&self) -> &str {
        "openrouter"
    }

    fn model_identifier(&self) -> String {
        self.model.clone()
    }

    fn supports_seed(&self) -> bool {
        // Seed handling varies by routed provider; only the OpenAI
        // family is known to honor it.
        self.model.starts_with("openai/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_support_depends_on_routed_model() {
        assert!(OpenRouterProvider::new("k", "openai/gpt-4-turbo").supports_seed());
        assert!(!OpenRouterProvider::new("k", "anthropic/claude-sonnet-4-5").supports_seed());
    }

    #[test]
    fn test_provider_name() {
        let provider = OpenRouterProvider::new("k", "openai/gpt-4-turbo");
        assert_eq!(provider.provider_name(), "openrouter");
    }
}
