//! OpenAI chat-completions provider
//!
//! Also home to the wire types shared with the other OpenAI-compatible
//! adapters (xAI, OpenRouter).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::retry::{with_retry, RetryConfig};
use super::{
    GenerateRequest, Message, ModelProvider, ModelReply, ProviderError, TokenUsage,
    DEFAULT_REQUEST_TIMEOUT,
};

/// Wire format for OpenAI-compatible chat-completions endpoints.
pub(super) mod wire {
    use super::*;

    #[derive(Serialize)]
    pub struct ChatRequest {
        pub model: String,
        pub messages: Vec<Message>,
        pub temperature: f32,
        pub max_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub seed: Option<u64>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub stop: Vec<String>,
    }

    #[derive(Deserialize)]
    pub struct ChatResponse {
        pub choices: Vec<Choice>,
        #[serde(default)]
        pub model: Option<String>,
        #[serde(default)]
        pub usage: Option<Usage>,
    }

    #[derive(Deserialize)]
    pub struct Choice {
        pub message: ChoiceMessage,
    }

    #[derive(Deserialize)]
    pub struct ChoiceMessage {
        #[serde(default)]
        pub content: Option<String>,
    }

    #[derive(Deserialize)]
    pub struct Usage {
        #[serde(default)]
        pub prompt_tokens: u32,
        #[serde(default)]
        pub completion_tokens: u32,
    }

    #[derive(Deserialize)]
    pub struct ApiError {
        pub error: ApiErrorDetail,
    }

    #[derive(Deserialize)]
    pub struct ApiErrorDetail {
        pub message: String,
    }

    /// POST a chat request and decode the response, classifying HTTP
    /// failures into [`ProviderError`]. Returns the decoded body and the
    /// observed latency.
    pub async fn execute(
        client: &reqwest::Client,
        url: &str,
        api_key: &str,
        extra_headers: &[(&str, String)],
        request: &ChatRequest,
        timeout: Duration,
        provider: &str,
    ) -> Result<(ChatResponse, u64), ProviderError> {
        let started = Instant::now();

        let mut builder = client
            .post(url)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(request);
        for (name, value) in extra_headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::from_status(
                status.as_u16(),
                message,
                provider,
                &request.model,
            ));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok((body, started.elapsed().as_millis() as u64))
    }

    pub fn reply_content(response: &ChatResponse) -> Result<String, ProviderError> {
        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::Parse("response carried no message content".into()))
    }

    pub fn reply_usage(response: &ChatResponse) -> TokenUsage {
        response
            .usage
            .as_ref()
            .map(|u| TokenUsage::from_parts(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default()
    }
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider. System messages travel in-band; seeding is supported.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl OpenAiProvider {
    /// Create from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::NotConfigured("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| OPENAI_BASE_URL.to_string()),
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
impl ModelProvider for OpenAiProvider {
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
        "openai"
    }

    fn model_identifier(&self) -> String {
        self.model.clone()
    }

    fn supports_seed(&self) -> bool {
        true
    }
}
