//! Mock agent provider: synthesizes agent JSON without any API
//!
//! Stands in for the extractor/verifier/questioner model during tests and
//! no-API runs. It sniffs the system prompt to decide which agent is
//! calling, then produces schema-correct JSON from simple deterministic
//! heuristics: sentence splitting for claims, token-overlap matching
//! against the answer key for verdicts, and scripted-turn echo for
//! questions.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Instant;

use super::{GenerateRequest, MessageRole, ModelProvider, ModelReply, ProviderError, TokenUsage};
use crate::coerce::coerce_json;
use crate::scenario::REFERRAL_EVIDENCE_ID;

/// Minimum fraction of a fact's content tokens a claim must share to be
/// counted as supporting that fact.
const MATCH_THRESHOLD: f64 = 0.5;

/// Sentences shorter than this are skipped by the mock extractor.
const MIN_CLAIM_CHARS: usize = 20;

const HEDGE_WORDS: &[&str] = &["may", "might", "often", "usually", "generally", "typically"];

const REFERRAL_MARKERS: &[&str] = &[
    "medicare.gov",
    "1-800",
    "call ",
    "contact ",
    "compare specific plans",
    "speaking with",
    "speak with",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "to", "of", "for", "with", "in", "on", "at", "by", "is",
    "are", "be", "it", "that", "this", "you", "your", "can", "will", "ll", "re", "ve", "t", "s",
];

/// Mock provider for agent roles. Always deterministic.
#[derive(Default)]
pub struct MockAgentProvider;

impl MockAgentProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelProvider for MockAgentProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, ProviderError> {
        let started = Instant::now();

        let system_prompt = request
            .messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();
        let user_message = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let content = if system_prompt.contains("questioner") {
            mock_questioner(user_message)
        } else if system_prompt.contains("extractor") {
            mock_extractor(user_message)
        } else if system_prompt.contains("verifier") {
            mock_verifier(user_message)
        } else {
            json!({"error": "unknown agent role"}).to_string()
        };

        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        Ok(ModelReply {
            content: content.clone(),
            model_identifier: self.model_identifier(),
            tokens_used: TokenUsage::from_parts(
                (prompt_chars / 4) as u32,
                (content.len() / 4) as u32,
            ),
            latency_ms: started.elapsed().as_millis() as u64,
            seed_applied: request.seed,
        })
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_identifier(&self) -> String {
        "mock-agent-v1.0".to_string()
    }

    fn supports_seed(&self) -> bool {
        true
    }
}

/// Echo the scripted turns embedded in the request, or fall back to a
/// canned opener.
fn mock_questioner(user_message: &str) -> String {
    if let Ok(input) = coerce_json(user_message) {
        if let Some(turns) = input.get("scripted_turns").and_then(Value::as_array) {
            let echoed: Vec<Value> = turns
                .iter()
                .map(|t| {
                    json!({
                        "turn_id": t.get("turn_id").cloned().unwrap_or(json!("Q1")),
                        "user_message": t.get("user_message").cloned().unwrap_or(json!("")),
                    })
                })
                .collect();
            return json!({ "turns": echoed }).to_string();
        }
    }

    json!({
        "turns": [{
            "turn_id": "Q1",
            "user_message": "I'm trying to decide between Original Medicare and Medicare Advantage. What's the difference?"
        }]
    })
    .to_string()
}

/// Split the response into sentence-level claims with real quote spans.
fn mock_extractor(user_message: &str) -> String {
    let response_text = coerce_json(user_message)
        .ok()
        .and_then(|v| {
            v.get("response_text")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| user_message.to_string());

    let mut claims = Vec::new();
    for (start, end) in sentence_spans(&response_text) {
        let raw = &response_text[start..end];
        let cleaned = raw.replace("**", "");
        let cleaned = cleaned.trim();
        if cleaned.len() < MIN_CLAIM_CHARS {
            continue;
        }

        let lower = cleaned.to_lowercase();
        let is_referral = REFERRAL_MARKERS.iter().any(|m| lower.contains(m));
        let is_hedged = tokenize(&lower)
            .iter()
            .any(|t| HEDGE_WORDS.contains(&t.as_str()));

        claims.push(json!({
            "claim_id": format!("C{}", claims.len() + 1),
            "text": cleaned,
            "claim_type": if is_referral { "referral" } else { "factual" },
            "confidence": "high",
            "verifiable": true,
            "quote_spans": [{"start": start, "end": end}],
            "is_hedged": is_hedged,
            "context_dependent": false,
        }));

        if claims.len() == 15 {
            break;
        }
    }

    json!({ "claims": claims }).to_string()
}

/// Judge claims against the embedded answer key by token overlap, with
/// disallowed-claim and referral handling.
fn mock_verifier(user_message: &str) -> String {
    let Ok(input) = coerce_json(user_message) else {
        return json!({"verdicts": []}).to_string();
    };
    let claims = input
        .get("claims")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let empty = Vec::new();
    let facts = input
        .pointer("/answer_key/canonical_facts")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let disallowed: Vec<String> = input
        .pointer("/answer_key/disallowed_claims")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();
    let has_referral_targets = input
        .pointer("/answer_key/acceptable_referrals")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());

    let fact_tokens: Vec<(String, HashSet<String>)> = facts
        .iter()
        .filter_map(|f| {
            let id = f.get("fact_id")?.as_str()?.to_string();
            let statement = f.get("statement")?.as_str()?;
            Some((id, tokenize(statement).into_iter().collect()))
        })
        .collect();

    let mut verdicts = Vec::new();
    for claim in &claims {
        let claim_id = claim
            .get("claim_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let text = claim.get("text").and_then(Value::as_str).unwrap_or_default();
        let claim_type = claim
            .get("claim_type")
            .and_then(Value::as_str)
            .unwrap_or("factual");
        let text_lower = text.to_lowercase();
        let claim_tokens: HashSet<String> = tokenize(&text_lower).into_iter().collect();

        let best = fact_tokens
            .iter()
            .map(|(id, tokens)| {
                let shared = tokens.intersection(&claim_tokens).count();
                let score = shared as f64 / tokens.len().max(1) as f64;
                (id.as_str(), score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let (label, evidence, severity) = if disallowed.iter().any(|d| text_lower.contains(d)) {
            let cited = best
                .map(|(id, _)| id)
                .or_else(|| fact_tokens.first().map(|(id, _)| id.as_str()))
                .unwrap_or(REFERRAL_EVIDENCE_ID);
            ("CONTRADICTED", vec![cited.to_string()], "high")
        } else if claim_type == "referral" && has_referral_targets {
            ("SUPPORTED", vec![REFERRAL_EVIDENCE_ID.to_string()], "none")
        } else {
            match best {
                Some((id, score)) if score >= MATCH_THRESHOLD => {
                    ("SUPPORTED", vec![id.to_string()], "none")
                }
                _ => ("NOT_IN_KEY", vec![], "none"),
            }
        };

        verdicts.push(json!({
            "claim_id": claim_id,
            "label": label,
            "evidence": evidence,
            "severity": severity,
            "notes": "mock verification via token overlap",
        }));
    }

    json!({ "verdicts": verdicts }).to_string()
}

/// Byte ranges of sentence-ish segments, split on periods and newlines.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut segment_start = 0;
    for (i, c) in text.char_indices() {
        if c == '.' || c == '\n' {
            if let Some(span) = trimmed_span(text, segment_start, i) {
                spans.push(span);
            }
            segment_start = i + c.len_utf8();
        }
    }
    if let Some(span) = trimmed_span(text, segment_start, text.len()) {
        spans.push(span);
    }
    spans
}

/// Narrow `[start, end)` past whitespace and list markers; None if empty.
fn trimmed_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let segment = &text[start..end];
    let leading = segment.len() - segment.trim_start_matches([' ', '\t', '-', '*', '>']).len();
    let trailing = segment.len() - segment.trim_end().len();
    let (s, e) = (start + leading, end - trailing);
    (s < e).then_some((s, e))
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}
