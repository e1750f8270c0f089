//! LLM provider adapters
//!
//! One trait, [`ModelProvider`], over every backend the pipeline can talk
//! to: OpenAI, Anthropic, Google Gemini, xAI Grok, OpenRouter, plus two
//! offline variants (`fake` canned responses and `mock-agent` heuristic
//! agent JSON) used for tests and no-API runs.
//!
//! Adapters hide provider quirks, most visibly where the system message
//! goes (in-band for the OpenAI family, a top-level field for Anthropic
//! and Gemini) and whether seeding is supported. They raise typed errors
//! and never return partial or invented content; the orchestrator decides
//! what a failure means for the trial.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod anthropic;
mod fake;
mod google;
mod mock_agent;
mod openai;
mod openrouter;
mod xai;

pub mod factory;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use fake::{FakeProvider, ResponseProfile};
pub use google::GoogleProvider;
pub use mock_agent::MockAgentProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;
pub use xai::XaiProvider;

/// Default per-request timeout for every provider call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from provider adapters.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Rate limit exceeded (HTTP 429). Transient.
    #[error("rate limit exceeded (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection-level failure. Transient.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request timed out. Transient.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Server-side failure (5xx). Transient.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Authentication failed (401/403). Fatal.
    #[error("authentication failed for {provider}")]
    Auth { provider: String },

    /// The requested model does not exist (404). Fatal.
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Request rejected by the provider (other 4xx). Fatal; never
    /// retried.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded. Fatal.
    #[error("response parse error: {0}")]
    Parse(String),

    /// Missing credentials or other construction failure. Fatal at
    /// startup.
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the retry layer may attempt this call again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Connection(_)
                | ProviderError::Timeout(_)
                | ProviderError::Server { .. }
        )
    }

    /// Classify an HTTP error status into the taxonomy above.
    pub(crate) fn from_status(status: u16, message: String, provider: &str, model: &str) -> Self {
        match status {
            429 => ProviderError::RateLimited { retry_after: None },
            401 | 403 => ProviderError::Auth {
                provider: provider.to_string(),
            },
            404 => ProviderError::ModelNotFound {
                model: model.to_string(),
            },
            400..=499 => ProviderError::Api { status, message },
            _ => ProviderError::Server { status, message },
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::Connection(e.to_string())
        }
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A chat message sent to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A generation request, uniform across providers
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,

    pub temperature: f32,
    pub max_tokens: u32,

    /// Applied when the provider supports seeding; otherwise ignored and
    /// reported through [`ModelProvider::supports_seed`].
    pub seed: Option<u64>,

    pub stop: Vec<String>,
}

impl GenerateRequest {
    /// Deterministic request with pipeline defaults.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: 0.0,
            max_tokens: 2048,
            seed: None,
            stop: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn from_parts(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }
}

/// A provider's reply to one generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    pub content: String,

    /// Full model version string as reported by the provider, with a
    /// `+noseed` marker appended when seeding was requested but the
    /// provider cannot honor it.
    pub model_identifier: String,

    pub tokens_used: TokenUsage,
    pub latency_ms: u64,

    /// The seed actually applied, when the provider supports seeding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_applied: Option<u64>,
}

/// Provider abstraction. The only place LLM calls are made.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Execute one generation request.
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError>;

    /// Short provider name for persistence and metrics ("openai",
    /// "fake", ...).
    fn provider_name(&self) -> &str;

    /// Best-known model version identifier.
    fn model_identifier(&self) -> String;

    /// Whether this provider/model honors the seed option. Callers must
    /// not assume reproducibility when this is false.
    fn supports_seed(&self) -> bool {
        false
    }
}

/// Append the no-seed marker when a seed was requested but unsupported.
pub(crate) fn seed_flagged_identifier(identifier: &str, seed_requested: bool, supported: bool) -> String {
    if seed_requested && !supported {
        format!("{identifier}+noseed")
    } else {
        identifier.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ctors() {
        assert_eq!(Message::system("s").role, MessageRole::System);
        assert_eq!(Message::user("u").role, MessageRole::User);
        assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
    }

    #[test]
    fn test_error_transience() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(ProviderError::Server {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!ProviderError::Auth {
            provider: "openai".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status(429, "".into(), "p", "m"),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(401, "".into(), "p", "m"),
            ProviderError::Auth { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(404, "".into(), "p", "m"),
            ProviderError::ModelNotFound { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(422, "".into(), "p", "m"),
            ProviderError::Api { status: 422, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(500, "".into(), "p", "m"),
            ProviderError::Server { status: 500, .. }
        ));
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::from_parts(100, 50);
        assert_eq!(usage.total, 150);
    }

    #[test]
    fn test_seed_flagged_identifier() {
        assert_eq!(seed_flagged_identifier("m-1", true, false), "m-1+noseed");
        assert_eq!(seed_flagged_identifier("m-1", true, true), "m-1");
        assert_eq!(seed_flagged_identifier("m-1", false, false), "m-1");
    }
}
