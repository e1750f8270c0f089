//! Pipeline artifacts: claims, verdicts, scores, and the trial record
//!
//! Claims reference canonical facts by fact_id string and verdicts
//! reference claims by claim_id string. This is an arena-of-strings
//! discipline rather than a pointer graph, so every artifact serializes
//! cleanly and survives persistence unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scenario::{FactSeverity, TargetParameters};

/// Types of claims the extractor can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Factual,
    /// How to do something
    Procedural,
    /// Time-bound information
    Temporal,
    /// If-then statements
    Conditional,
    /// Directing to another resource
    Referral,
}

/// Extractor's confidence that this is a distinct claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Character span into the source response text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSpan {
    pub start: usize,
    pub end: usize,
}

/// An atomic, verifiable claim extracted from a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Trial-scoped id ("C1".."Cn")
    pub claim_id: String,

    /// The claim in plain language, preserving the original wording
    pub text: String,

    pub claim_type: ClaimType,
    pub confidence: Confidence,

    /// Whether this can be checked against the answer key
    pub verifiable: bool,

    /// Character spans in the original response
    #[serde(default)]
    pub quote_spans: Vec<QuoteSpan>,

    /// Contains qualifiers like "may", "might", "generally"
    #[serde(default)]
    pub is_hedged: bool,

    /// Meaning depends on prior conversation context
    #[serde(default)]
    pub context_dependent: bool,
}

/// Possible verdicts on a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    /// Entailed by one or more canonical facts
    Supported,
    /// Conflicts with one or more canonical facts
    Contradicted,
    /// Neither supported nor contradicted by any fact
    NotInKey,
    /// Partially aligns but omits required nuance
    PartiallyCorrect,
}

impl VerdictLabel {
    /// Safety-conservative ordering used to break adjudication ties:
    /// CONTRADICTED > PARTIALLY_CORRECT > SUPPORTED > NOT_IN_KEY.
    pub fn tie_break_rank(self) -> u8 {
        match self {
            VerdictLabel::Contradicted => 3,
            VerdictLabel::PartiallyCorrect => 2,
            VerdictLabel::Supported => 1,
            VerdictLabel::NotInKey => 0,
        }
    }
}

/// Harm risk carried by a verdict. `None` for every label except
/// CONTRADICTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl From<FactSeverity> for Severity {
    fn from(value: FactSeverity) -> Self {
        match value {
            FactSeverity::Low => Severity::Low,
            FactSeverity::Medium => Severity::Medium,
            FactSeverity::High => Severity::High,
            FactSeverity::Critical => Severity::Critical,
        }
    }
}

/// A single judge's ruling on one claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub claim_id: String,
    pub label: VerdictLabel,

    /// Fact ids from the answer key supporting the verdict
    #[serde(default)]
    pub evidence: Vec<String>,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub notes: String,
}

/// Output of one verifier instance. Verdicts are owned by exactly one
/// judge; nothing crosses judge boundaries before adjudication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Stable id for this verifier instance ("V1".."VN")
    pub verifier_id: String,

    pub verdicts: Vec<Verdict>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Output of the adjudicator: one verdict per claim plus disagreement
/// accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjudicationReport {
    pub final_verdicts: Vec<Verdict>,

    /// Share of claims on which the judges did not all agree
    pub disagreement_percentage: f64,

    /// Advisory flag; the pipeline continues to scoring either way
    pub needs_manual_review: bool,

    #[serde(default)]
    pub notes: String,
}

/// Types of potential harm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmCategory {
    FinancialHarm,
    CoverageHarm,
    LegalHarm,
    FalseReassurance,
}

/// Output of the scoring engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Numeric score from the scenario rubric (1..4 for SHIP)
    pub rubric_score: Option<u8>,

    /// Human-readable tier label
    pub rubric_label: Option<String>,

    /// Share of required points covered, in [0, 1]
    pub completeness_percentage: f64,

    /// Share of decided verifiable claims that are SUPPORTED, in [0, 1]
    pub accuracy_percentage: f64,

    #[serde(default)]
    pub missing_required_points: Vec<String>,

    #[serde(default)]
    pub error_categories: Vec<String>,

    #[serde(default)]
    pub harm_categories: Vec<HarmCategory>,

    pub justification: String,
}

/// Special conditions detected during the trial
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialFlags {
    /// Model refused to answer
    #[serde(default)]
    pub refusal: bool,

    /// Made up specific details not in the answer key
    #[serde(default)]
    pub hallucinated_specifics: bool,

    /// Model asked for more information
    #[serde(default)]
    pub asked_clarifying_questions: bool,

    /// Directed the user to official resources
    #[serde(default)]
    pub referenced_external_resources: bool,
}

/// Message role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single turn in the conversation with the target model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The model under evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
    pub provider: String,
    pub model_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,

    pub parameters: TargetParameters,
}

/// The model powering the evaluation agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub provider: String,
    pub model_name: String,
}

/// Reproducibility metadata captured with every trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialMetadata {
    pub judge_count: usize,
    pub seed: u64,

    #[serde(default)]
    pub disagreement_percentage: f64,

    /// Set when the trial was aborted before completion
    #[serde(default)]
    pub aborted: bool,

    /// Name -> SHA-256 digest of each agent system prompt used
    #[serde(default)]
    pub prompt_digests: std::collections::BTreeMap<String, String>,
}

/// Complete result of a single evaluation trial. Written exactly once;
/// re-runs mint a new trial_id and a new run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: String,
    pub scenario_id: String,
    pub target: TargetInfo,
    pub agent: AgentInfo,
    pub conversation: Vec<ConversationTurn>,
    pub claims: Vec<Claim>,

    /// Per-judge verdicts, indexed by verifier_id
    pub verifications: Vec<VerificationReport>,

    /// Exactly one adjudicated verdict per claim
    pub adjudicated_verdicts: Vec<Verdict>,

    /// Absent when the trial was aborted before scoring
    pub final_scores: Option<ScoreResult>,

    pub flags: TrialFlags,

    /// Descriptive error record for aborted trials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub metadata: TrialMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_label_wire_format() {
        assert_eq!(
            serde_json::to_string(&VerdictLabel::NotInKey).unwrap(),
            "\"NOT_IN_KEY\""
        );
        assert_eq!(
            serde_json::to_string(&VerdictLabel::PartiallyCorrect).unwrap(),
            "\"PARTIALLY_CORRECT\""
        );
        let parsed: VerdictLabel = serde_json::from_str("\"SUPPORTED\"").unwrap();
        assert_eq!(parsed, VerdictLabel::Supported);
    }

    #[test]
    fn test_tie_break_rank_is_safety_conservative() {
        let mut labels = [
            VerdictLabel::Supported,
            VerdictLabel::NotInKey,
            VerdictLabel::Contradicted,
            VerdictLabel::PartiallyCorrect,
        ];
        labels.sort_by_key(|l| std::cmp::Reverse(l.tie_break_rank()));
        assert_eq!(labels[0], VerdictLabel::Contradicted);
        assert_eq!(labels[3], VerdictLabel::NotInKey);
    }

    #[test]
    fn test_severity_from_fact_severity() {
        assert_eq!(Severity::from(FactSeverity::Critical), Severity::Critical);
        assert!(Severity::from(FactSeverity::High) > Severity::Medium);
        assert_eq!(Severity::default(), Severity::None);
    }

    #[test]
    fn test_claim_round_trip() {
        let claim = Claim {
            claim_id: "C1".into(),
            text: "Part A covers hospital stays".into(),
            claim_type: ClaimType::Factual,
            confidence: Confidence::High,
            verifiable: true,
            quote_spans: vec![QuoteSpan { start: 10, end: 38 }],
            is_hedged: false,
            context_dependent: false,
        };
        let json = serde_json::to_string(&claim).unwrap();
        assert!(json.contains("\"factual\""));
        let parsed: Claim = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.quote_spans, claim.quote_spans);
    }
}
