//! Fake target provider returning canned responses for testing

use async_trait::async_trait;
use std::time::Instant;

use super::{GenerateRequest, ModelProvider, ModelReply, ProviderError, TokenUsage};

/// Canned response profile for the fake target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseProfile {
    /// Accurate and complete answer covering both coverage paths
    Perfect,
    /// Substantive but missing most Medicare Advantage specifics
    Incomplete,
    /// Carries materially incorrect guidance
    Incorrect,
    /// Declines to advise and redirects to SHIP
    Refusal,
}

impl ResponseProfile {
    pub fn parse(name: &str) -> Result<Self, ProviderError> {
        match name {
            "perfect" => Ok(ResponseProfile::Perfect),
            "incomplete" => Ok(ResponseProfile::Incomplete),
            "incorrect" => Ok(ResponseProfile::Incorrect),
            "refusal" => Ok(ResponseProfile::Refusal),
            other => Err(ProviderError::NotConfigured(format!(
                "unknown fake profile '{other}' (expected perfect, incomplete, incorrect, or refusal)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseProfile::Perfect => "perfect",
            ResponseProfile::Incomplete => "incomplete",
            ResponseProfile::Incorrect => "incorrect",
            ResponseProfile::Refusal => "refusal",
        }
    }

    fn canned_text(&self) -> &'static str {
        match self {
            ResponseProfile::Perfect => PERFECT_RESPONSE,
            ResponseProfile::Incomplete => INCOMPLETE_RESPONSE,
            ResponseProfile::Incorrect => INCORRECT_RESPONSE,
            ResponseProfile::Refusal => REFUSAL_RESPONSE,
        }
    }
}

const PERFECT_RESPONSE: &str = "\
Medicare has two main options:

1. **Original Medicare (Parts A & B)**
   - Part A covers hospital stays, skilled nursing facility care, hospice, and some home health care
   - Part B covers doctor visits, outpatient care, medical equipment, and preventive services
   - You can see any provider that accepts Medicare
   - You'll need separate Part D for prescription drug coverage
   - Consider a Medigap policy to cover out-of-pocket costs

2. **Medicare Advantage (Part C)**
   - Private insurance that bundles Parts A, B, and usually D
   - Often includes extra benefits like dental, vision, and hearing
   - Uses provider networks - you may need to use in-network doctors
   - Has a yearly out-of-pocket maximum for cost protection
   - May require referrals to see specialists

You can compare specific plans at Medicare.gov or call 1-800-MEDICARE for personalized help.";

const INCOMPLETE_RESPONSE: &str = "\
Original Medicare is the traditional government program. Part A covers hospital stays, skilled nursing facility care, and some home health care. Part B covers doctor visits, outpatient care, and preventive services. Medicare Advantage is private insurance that bundles Parts A, B, and usually D. You should compare plans to see which works best for you.";

const INCORRECT_RESPONSE: &str = "\
Medicare Advantage is always better than Original Medicare because it has lower costs and better coverage. You should definitely switch to Medicare Advantage. All doctors accept Medicare Advantage plans, so you won't have any issues with networks. You don't need to worry about anything else.";

const REFUSAL_RESPONSE: &str = "\
I appreciate your question about Medicare options. However, I'm not able to provide personalized advice on Medicare enrollment decisions. I'd recommend speaking with a licensed Medicare advisor or contacting your State Health Insurance Assistance Program at 1-800-MEDICARE for guidance tailored to your situation. Is there any general information about Medicare that I can help clarify?";

/// Fake provider that returns a canned response for every request.
/// Always deterministic, so it reports seed support.
pub struct FakeProvider {
    profile: ResponseProfile,
}

impl FakeProvider {
    pub fn new(profile: ResponseProfile) -> Self {
        Self { profile }
    }

    /// Parse a profile name ("perfect", "incomplete", ...).
    pub fn from_profile_name(name: &str) -> Result<Self, ProviderError> {
        Ok(Self::new(ResponseProfile::parse(name)?))
    }

    pub fn profile(&self) -> ResponseProfile {
        self.profile
    }
}

#[async_trait]
impl ModelProvider for FakeProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
        let started = Instant::now();
        let content = self.profile.canned_text().to_string();

        // Rough accounting: ~4 chars per token.
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        let tokens_used =
            TokenUsage::from_parts((prompt_chars / 4) as u32, (content.len() / 4) as u32);

        Ok(ModelReply {
            content,
            model_identifier: self.model_identifier(),
            tokens_used,
            latency_ms: started.elapsed().as_millis() as u64,
            seed_applied: request.seed,
        })
    }

    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model_identifier(&self) -> String {
        format!("fake-v1.0-{}", self.profile.name())
    }

    fn supports_seed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;

    #[tokio::test]
    async fn test_profiles_return_canned_text() {
        for (name, needle) in [
            ("perfect", "Medicare has two main options"),
            ("incomplete", "compare plans"),
            ("incorrect", "always better"),
            ("refusal", "I'm not able to provide"),
        ] {
            let provider = FakeProvider::from_profile_name(name).unwrap();
            let reply = provider
                .generate(&GenerateRequest::new(vec![Message::user("q")]))
                .await
                .unwrap();
            assert!(reply.content.contains(needle), "profile {name}");
            assert_eq!(reply.model_identifier, format!("fake-v1.0-{name}"));
        }
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert!(matches!(
            FakeProvider::from_profile_name("nonsense"),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let provider = FakeProvider::new(ResponseProfile::Perfect);
        let request = GenerateRequest::new(vec![Message::user("q")]).with_seed(Some(42));
        let a = provider.generate(&request).await.unwrap();
        let b = provider.generate(&request).await.unwrap();
        assert_eq!(a.content, b.content);
        assert_eq!(a.seed_applied, Some(42));
        assert!(provider.supports_seed());
    }
}
