//! Verifier agent: judges claims strictly against the answer key

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::prompts;
use super::AgentError;
use crate::coerce::coerce_json;
use crate::providers::{GenerateRequest, Message, ModelProvider};
use crate::scenario::AnswerKey;
use crate::trial::{Claim, Severity, Verdict, VerdictLabel, VerificationReport};

const VERIFICATION_MAX_TOKENS: u32 = 4096;

/// One verifier instance. The orchestrator runs N of these with the same
/// prompt and answer key; they never observe each other's verdicts.
pub struct Verifier {
    provider: Arc<dyn ModelProvider>,
    verifier_id: String,
    seed: u64,
}

impl Verifier {
    pub fn new(provider: Arc<dyn ModelProvider>, verifier_id: impl Into<String>, seed: u64) -> Self {
        Self {
            provider,
            verifier_id: verifier_id.into(),
            seed,
        }
    }

    pub fn verifier_id(&self) -> &str {
        &self.verifier_id
    }

    /// Judge every claim against the answer key. Protocol failures get
    /// one retry with the same prompt.
    pub async fn verify(
        &self,
        claims: &[Claim],
        answer_key: &AnswerKey,
    ) -> Result<VerificationReport, AgentError> {
        match self.verify_once(claims, answer_key).await {
            Ok(report) => Ok(report),
            Err(e) if e.is_retryable_protocol() => {
                tracing::warn!(
                    verifier_id = %self.verifier_id,
                    error = %e,
                    "verifier protocol failure, retrying once"
                );
                self.verify_once(claims, answer_key).await
            }
            Err(e) => Err(e),
        }
    }

    async fn verify_once(
        &self,
        claims: &[Claim],
        answer_key: &AnswerKey,
    ) -> Result<VerificationReport, AgentError> {
        let user_input = json!({
            "claims": claims,
            "answer_key": answer_key,
        });
        let request = GenerateRequest::new(vec![
            Message::system(prompts::VERIFIER_SYSTEM),
            Message::user(format!(
                "Verify these claims against the answer key:\n\n{}",
                serde_json::to_string_pretty(&user_input).unwrap_or_default()
            )),
        ])
        .with_max_tokens(VERIFICATION_MAX_TOKENS)
        .with_seed(self.provider.supports_seed().then_some(self.seed));

        let reply = self.provider.generate(&request).await?;
        let value = coerce_json(&reply.content).map_err(|source| AgentError::Protocol {
            agent: "verifier",
            source,
        })?;

        #[derive(Deserialize)]
        struct Verification {
            verdicts: Vec<Verdict>,
        }
        let parsed: Verification =
            serde_json::from_value(value).map_err(|e| AgentError::Schema {
                agent: "verifier",
                detail: e.to_string(),
            })?;

        let verdicts = validate_verdicts(parsed.verdicts, claims, answer_key)?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("model".into(), json!(self.provider.model_identifier()));
        metadata.insert("num_verdicts".into(), json!(verdicts.len()));
        metadata.insert("num_facts".into(), json!(answer_key.canonical_facts.len()));

        Ok(VerificationReport {
            verifier_id: self.verifier_id.clone(),
            verdicts,
            metadata,
        })
    }
}

/// Enforce the verifier's output contract: exactly one verdict per claim,
/// every cited evidence id known to the answer key, at least one citation
/// on decided labels, and severity coherent with the label.
fn validate_verdicts(
    mut verdicts: Vec<Verdict>,
    claims: &[Claim],
    answer_key: &AnswerKey,
) -> Result<Vec<Verdict>, AgentError> {
    let claim_ids: HashSet<&str> = claims.iter().map(|c| c.claim_id.as_str()).collect();
    let verdict_ids: HashSet<&str> = verdicts.iter().map(|v| v.claim_id.as_str()).collect();

    if claim_ids != verdict_ids || verdicts.len() != claims.len() {
        let missing: Vec<_> = claim_ids.difference(&verdict_ids).collect();
        let extra: Vec<_> = verdict_ids.difference(&claim_ids).collect();
        return Err(AgentError::Schema {
            agent: "verifier",
            detail: format!(
                "verdict/claim mismatch: missing verdicts for {missing:?}, extra verdicts {extra:?}"
            ),
        });
    }

    for verdict in &verdicts {
        for evidence_id in &verdict.evidence {
            if !answer_key.knows_evidence_id(evidence_id) {
                return Err(AgentError::Schema {
                    agent: "verifier",
                    detail: format!(
                        "verdict on {} cites unknown fact_id '{evidence_id}'",
                        verdict.claim_id
                    ),
                });
            }
        }
        if verdict.label != VerdictLabel::NotInKey && verdict.evidence.is_empty() {
            return Err(AgentError::Schema {
                agent: "verifier",
                detail: format!(
                    "{:?} verdict on {} cites no evidence",
                    verdict.label, verdict.claim_id
                ),
            });
        }
    }

    // Judges occasionally attach a severity to non-contradicted labels;
    // normalize rather than fail the trial.
    for verdict in &mut verdicts {
        if verdict.label != VerdictLabel::Contradicted && verdict.severity != Severity::None {
            tracing::warn!(
                claim_id = %verdict.claim_id,
                label = ?verdict.label,
                severity = ?verdict.severity,
                "clearing severity on non-contradicted verdict"
            );
            verdict.severity = Severity::None;
        }
    }

    Ok(verdicts)
}
