//! Extractor agent: decomposes a response into atomic claims

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::prompts;
use super::AgentError;
use crate::coerce::coerce_json;
use crate::providers::{GenerateRequest, Message, ModelProvider};
use crate::trial::Claim;

/// Token budget for extraction calls; extraction output can be verbose.
const EXTRACTION_MAX_TOKENS: u32 = 4096;

/// The claims extractor agent.
pub struct Extractor {
    provider: Arc<dyn ModelProvider>,
    seed: u64,
}

impl Extractor {
    pub fn new(provider: Arc<dyn ModelProvider>, seed: u64) -> Self {
        Self { provider, seed }
    }

    /// Extract claims from a target response.
    ///
    /// Protocol failures (no JSON, schema mismatch) get one retry with
    /// the same prompt before surfacing.
    pub async fn extract(&self, response_text: &str) -> Result<Vec<Claim>, AgentError> {
        match self.extract_once(response_text).await {
            Ok(claims) => Ok(claims),
            Err(e) if e.is_retryable_protocol() => {
                tracing::warn!(error = %e, "extractor protocol failure, retrying once");
                self.extract_once(response_text).await
            }
            Err(e) => Err(e),
        }
    }

    async fn extract_once(&self, response_text: &str) -> Result<Vec<Claim>, AgentError> {
        let user_input = json!({
            "response_text": response_text,
            "conversation_context": [],
        });
        let request = GenerateRequest::new(vec![
            Message::system(prompts::EXTRACTOR_SYSTEM),
            Message::user(format!(
                "Extract claims from this response:\n\n{}",
                serde_json::to_string_pretty(&user_input).unwrap_or_default()
            )),
        ])
        .with_max_tokens(EXTRACTION_MAX_TOKENS)
        .with_seed(self.provider.supports_seed().then_some(self.seed));

        let reply = self.provider.generate(&request).await?;
        let value = coerce_json(&reply.content).map_err(|source| AgentError::Protocol {
            agent: "extractor",
            source,
        })?;

        #[derive(Deserialize)]
        struct Extraction {
            claims: Vec<Claim>,
        }
        let parsed: Extraction = serde_json::from_value(value).map_err(|e| AgentError::Schema {
            agent: "extractor",
            detail: e.to_string(),
        })?;

        validate_claims(parsed.claims, response_text)
    }
}

/// Enforce the extractor's output contract: unique claim ids and quote
/// spans that reference the source text. Out-of-range spans are dropped
/// with a warning rather than failing the trial.
fn validate_claims(mut claims: Vec<Claim>, source: &str) -> Result<Vec<Claim>, AgentError> {
    let mut seen = HashSet::new();
    for claim in &claims {
        if claim.claim_id.is_empty() || !seen.insert(claim.claim_id.clone()) {
            return Err(AgentError::Schema {
                agent: "extractor",
                detail: format!("missing or duplicate claim_id '{}'", claim.claim_id),
            });
        }
    }

    for claim in &mut claims {
        let before = claim.quote_spans.len();
        claim
            .quote_spans
            .retain(|span| span.start < span.end && span.end <= source.len());
        if claim.quote_spans.len() < before {
            tracing::warn!(
                claim_id = %claim.claim_id,
                dropped = before - claim.quote_spans.len(),
                "dropped quote spans outside the response text"
            );
        }
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        FakeProvider, MockAgentProvider, ModelReply, ProviderError, ResponseProfile, TokenUsage,
    };
    use crate::trial::{ClaimType, Confidence, QuoteSpan};
    use async_trait::async_trait;

    #[tokio::test]
    async fn test_extract_with_mock_agent() {
        let target = FakeProvider::new(ResponseProfile::Perfect);
        let response = target
            .generate(&GenerateRequest::new(vec![Message::user("q")]))
            .await
            .unwrap();

        let extractor = Extractor::new(Arc::new(MockAgentProvider::new()), 42);
        let claims = extractor.extract(&response.content).await.unwrap();

        assert!(!claims.is_empty());
        assert!(claims.iter().any(|c| c.claim_type == ClaimType::Referral));
        // Spans reference the actual response text.
        for claim in &claims {
            for span in &claim.quote_spans {
                assert!(span.end <= response.content.len());
                assert!(span.start < span.end);
            }
        }
    }

    #[test]
    fn test_validate_drops_out_of_range_spans() {
        let claims = vec![Claim {
            claim_id: "C1".into(),
            text: "Part A covers hospital stays".into(),
            claim_type: ClaimType::Factual,
            confidence: Confidence::High,
            verifiable: true,
            quote_spans: vec![QuoteSpan { start: 0, end: 9999 }, QuoteSpan { start: 0, end: 5 }],
            is_hedged: false,
            context_dependent: false,
        }];

        let validated = validate_claims(claims, "short source text").unwrap();
        assert_eq!(validated[0].quote_spans, vec![QuoteSpan { start: 0, end: 5 }]);
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let claim = Claim {
            claim_id: "C1".into(),
            text: "x".into(),
            claim_type: ClaimType::Factual,
            confidence: Confidence::High,
            verifiable: true,
            quote_spans: vec![],
            is_hedged: false,
            context_dependent: false,
        };
        let result = validate_claims(vec![claim.clone(), claim], "source");
        assert!(matches!(result, Err(AgentError::Schema { .. })));
    }

    /// Provider that answers prose first, then valid JSON: exercises the
    /// one-retry protocol budget.
    struct FlakyJsonProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ModelProvider for FlakyJsonProvider {
        async fn generate(&self, _request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let content = if call == 0 {
                "Sorry, I had trouble formatting that.".to_string()
            } else {
                r#"{"claims": [{"claim_id": "C1", "text": "Part B covers doctor visits", "claim_type": "factual", "confidence": "high", "verifiable": true, "quote_spans": [], "is_hedged": false, "context_dependent": false}]}"#.to_string()
            };
            Ok(ModelReply {
                content,
                model_identifier: "flaky".into(),
                tokens_used: TokenUsage::default(),
                latency_ms: 0,
                seed_applied: None,
            })
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }

        fn model_identifier(&self) -> String {
            "flaky".into()
        }
    }

    #[tokio::test]
    async fn test_protocol_failure_retried_once() {
        let provider = Arc::new(FlakyJsonProvider {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let extractor = Extractor::new(provider.clone(), 42);

        let claims = extractor.extract("Part B covers doctor visits.").await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
