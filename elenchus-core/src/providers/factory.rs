//! Factory for creating providers from `provider:model` target specs

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::{
    AnthropicProvider, FakeProvider, GoogleProvider, MockAgentProvider, ModelProvider,
    OpenAiProvider, OpenRouterProvider, ProviderError, XaiProvider, DEFAULT_REQUEST_TIMEOUT,
};

/// A parsed `provider:model` specification, e.g. `openrouter:openai/gpt-4-turbo`
/// or `fake:perfect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub provider: String,
    pub model: String,
}

impl TargetSpec {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl FromStr for TargetSpec {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = s.split_once(':').ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "invalid target spec '{s}': expected 'provider:model_name'"
            ))
        })?;
        if provider.is_empty() || model.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "invalid target spec '{s}': expected 'provider:model_name'"
            )));
        }
        Ok(Self::new(provider.to_lowercase(), model))
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Create a provider for the given spec with the default request
/// timeout. Credentials are read from the provider's environment
/// variable; a missing key is a configuration error surfaced before any
/// run directory is created.
pub fn create(spec: &TargetSpec) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    create_with_timeout(spec, DEFAULT_REQUEST_TIMEOUT)
}

/// Create a provider with an explicit per-request timeout.
pub fn create_with_timeout(
    spec: &TargetSpec,
    timeout: Duration,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    match spec.provider.as_str() {
        "openai" => Ok(Arc::new(
            OpenAiProvider::from_env(&spec.model)?.with_timeout(timeout),
        )),
        "anthropic" => Ok(Arc::new(
            AnthropicProvider::from_env(&spec.model)?.with_timeout(timeout),
        )),
        "google" | "gemini" => Ok(Arc::new(
            GoogleProvider::from_env(&spec.model)?.with_timeout(timeout),
        )),
        "xai" | "grok" => Ok(Arc::new(
            XaiProvider::from_env(&spec.model)?.with_timeout(timeout),
        )),
        "openrouter" => Ok(Arc::new(
            OpenRouterProvider::from_env(&spec.model)?.with_timeout(timeout),
        )),
        "fake" => Ok(Arc::new(FakeProvider::from_profile_name(&spec.model)?)),
        "mock" => Ok(Arc::new(MockAgentProvider::new())),
        other => Err(ProviderError::NotConfigured(format!(
            "unknown provider '{other}' (supported: openai, anthropic, google, xai, openrouter, fake, mock)"
        ))),
    }
}
