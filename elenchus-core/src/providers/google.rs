//! Google Gemini provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::retry::{with_retry, RetryConfig};
use super::{
    seed_flagged_identifier, GenerateRequest, MessageRole, ModelProvider, ModelReply,
    ProviderError, TokenUsage, DEFAULT_REQUEST_TIMEOUT,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider. The system message becomes a
/// `system_instruction` block; assistant turns use the "model" role.
/// Seeding is not officially supported.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl GoogleProvider {
    /// Create from `GOOGLE_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| ProviderError::NotConfigured("GOOGLE_API_KEY not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
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
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "stopSequences", skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(rename = "modelVersion", default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn convert_request(request: &GenerateRequest) -> GeminiRequest {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for msg in &request.messages {
        match msg.role {
            MessageRole::System => {
                system_instruction = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                });
            }
            MessageRole::User | MessageRole::Assistant => {
                let role = if msg.role == MessageRole::User {
                    "user"
                } else {
                    "model"
                };
                contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                });
            }
        }
    }

    GeminiRequest {
        system_instruction,
        contents,
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            stop_sequences: request.stop.clone(),
        },
    }
}

impl GoogleProvider {
    async fn call_once(
        &self,
        request: &GeminiRequest,
    ) -> Result<(GeminiResponse, u64), ProviderError> {
        let started = Instant::now();
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited { retry_after: None });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::from_status(
                status.as_u16(),
                message,
                self.provider_name(),
                &self.model,
            ));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok((body, started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
        let wire_request = convert_request(request);

        let (response, latency_ms) =
            with_retry(&self.retry, || self.call_once(&wire_request)).await?;

        let content = response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ProviderError::Parse("response carried no candidates".into()))?;

        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| TokenUsage::from_parts(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        let identifier = response
            .model_version
            .clone()
            .unwrap_or_else(|| self.model.clone());

        Ok(ModelReply {
            content,
            model_identifier: seed_flagged_identifier(
                &identifier,
                request.seed.is_some(),
                self.supports_seed(),
            ),
            tokens_used: usage,
            latency_ms,
            seed_applied: None,
        })
    }

    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_identifier(&self) -> String {
        self.model.clone()
    }
}
