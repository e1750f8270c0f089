//! Anthropic (Claude) provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::retry::{with_retry, RetryConfig};
use super::{
    seed_flagged_identifier, GenerateRequest, Message, MessageRole, ModelProvider, ModelReply,
    ProviderError, TokenUsage, DEFAULT_REQUEST_TIMEOUT,
};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic provider. The system message moves to a top-level request
/// field; seeding is not supported and is reported as such.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl AnthropicProvider {
    /// Create from `ANTHROPIC_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| ANTHROPIC_BASE_URL.to_string()),
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

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

/// Convert messages to Anthropic format, lifting the system prompt out.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system = None;
    let mut converted = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system = Some(msg.content.clone()),
            MessageRole::User => converted.push(AnthropicMessage {
                role: "user",
                content: msg.content.clone(),
            }),
            MessageRole::Assistant => converted.push(AnthropicMessage {
                role: "assistant",
                content: msg.content.clone(),
            }),
        }
    }

    (system, converted)
}

impl AnthropicProvider {
    async fn call_once(&self, request: &AnthropicRequest) -> Result<(AnthropicResponse, u64), ProviderError> {
        let started = Instant::now();
        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

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
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::from_status(
                status.as_u16(),
                message,
                self.provider_name(),
                &self.model,
            ));
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok((body, started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
        let (system, messages) = convert_messages(&request.messages);
        let wire_request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: request.temperature,
            stop_sequences: request.stop.clone(),
        };

        let (response, latency_ms) =
            with_retry(&self.retry, || self.call_once(&wire_request)).await?;

        let content = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.clone())
            .collect::<Vec<_>>()
            .join("");

        Ok(ModelReply {
            content,
            model_identifier: seed_flagged_identifier(
                &response.model,
                request.seed.is_some(),
                self.supports_seed(),
            ),
            tokens_used: TokenUsage::from_parts(
                response.usage.input_tokens,
                response.usage.output_tokens,
            ),
            latency_ms,
            seed_applied: None,
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_identifier(&self) -> String {
        self.model.clone()
    }
}
