//! Scenario definitions: persona, scripted turns, answer key, rubric
//!
//! A scenario is the unit of test input: a scripted beneficiary
//! conversation plus the ground truth used to judge the target model's
//! answers. Scenarios are loaded once per trial and treated as read-only
//! for the duration of a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ElenchusError, Result};

/// Potential harm if a canonical fact is wrong or omitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single verifiable fact from the answer key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalFact {
    /// Unique identifier, scenario-scoped (e.g. "F1", "F3_MA")
    pub fact_id: String,

    /// The factual statement
    pub statement: String,

    /// Why this is true
    pub rationale: String,

    /// Authoritative source reference
    pub source: String,

    /// Harm risk if this fact is contradicted or omitted
    pub severity_if_wrong: FactSeverity,
}

/// Evidence id verifiers cite for referral claims that align with the
/// answer key's acceptable redirects. Not a canonical fact id.
pub const REFERRAL_EVIDENCE_ID: &str = "acceptable_referrals";

/// Ground truth for evaluating a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerKey {
    /// All verifiable facts for this scenario
    pub canonical_facts: Vec<CanonicalFact>,

    /// Fact ids that must be covered for completeness
    pub required_points: Vec<String>,

    /// Fact ids that improve but aren't required
    #[serde(default)]
    pub optional_enrichments: Vec<String>,

    /// Statements that should never be made
    #[serde(default)]
    pub disallowed_claims: Vec<String>,

    /// Valid redirects to other resources (e.g. "Contact plan directly")
    #[serde(default)]
    pub acceptable_referrals: Vec<String>,
}

impl AnswerKey {
    /// Look up a canonical fact by id.
    pub fn fact(&self, fact_id: &str) -> Option<&CanonicalFact> {
        self.canonical_facts.iter().find(|f| f.fact_id == fact_id)
    }

    /// Whether an evidence id is citable: a canonical fact id or the
    /// referral sentinel.
    pub fn knows_evidence_id(&self, id: &str) -> bool {
        id == REFERRAL_EVIDENCE_ID || self.fact(id).is_some()
    }
}

/// Beneficiary persona for the scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub age: u32,
    pub location: String,
    pub current_coverage: String,

    /// Brief description of their circumstances
    pub situation: String,

    /// Name of their PCP, for network verification questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_care_physician: Option<String>,
}

/// A single turn in the conversation script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedTurn {
    pub turn_id: String,

    /// SHIP question number this turn corresponds to, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_number: Option<u32>,

    pub user_message: String,

    /// Topics that should be addressed
    #[serde(default)]
    pub expected_topics: Vec<String>,

    /// Map of response patterns to next turn_id for branching
    #[serde(default)]
    pub conditional_next: std::collections::BTreeMap<String, String>,
}

/// Time bounds for when scenario facts are valid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalValidity {
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,

    #[serde(default)]
    pub notes: String,
}

/// Sampling parameters for the target model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetParameters {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TargetParameters {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 2048,
            top_p: 1.0,
            seed: None,
        }
    }
}

/// Coverage information for a specific medication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugCoverage {
    pub drug_name: String,
    pub is_covered: bool,

    /// Formulary tier (1-5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copay: Option<f64>,

    #[serde(default)]
    pub prior_authorization_required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_limits: Option<String>,
}

/// Medicare plan type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    #[serde(rename = "HMO")]
    Hmo,
    #[serde(rename = "PPO")]
    Ppo,
    #[serde(rename = "PFFS")]
    Pffs,
    #[serde(rename = "SNP")]
    Snp,
}

/// Medicare Advantage plan details for answer-key verification and
/// question placeholder substitution.
///
/// Per SHIP study fidelity this information is never sent to the target
/// model; it only feeds the questioner's substitution and the answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanInformation {
    /// Full plan name (e.g. "Humana Gold Plus HMO")
    pub plan_name: String,

    pub plan_type: PlanType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_area: Option<String>,

    /// Plan premium, not including Part B
    pub monthly_premium: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_b_premium: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deductible: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_out_of_pocket: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_care_copay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist_copay: Option<f64>,

    pub out_of_network_allowed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_network_primary_care_copay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_network_specialist_copay: Option<f64>,

    pub includes_drug_coverage: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_formulary: Option<Vec<DrugCoverage>>,

    /// Extra benefits (dental, vision, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_benefits: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_referrals: Option<bool>,

    #[serde(default = "default_true")]
    pub available_in_service_area: bool,
}

fn default_true() -> bool {
    true
}

/// One tier of a scenario's scoring rubric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricTier {
    pub label: String,

    /// Human-readable criteria for this tier
    #[serde(default)]
    pub criteria: Vec<String>,

    /// Pointer into the SHIP study rubric (eAppendix reference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship_reference: Option<String>,
}

/// Scenario-specific scoring rubric (SHIP four-tier classification).
///
/// `fact_categories` optionally partitions the required points by fact-id
/// suffix (e.g. `["_MA", "_TM"]`); the top tier then requires full coverage
/// of every category. Without it, all required points form one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringRubric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_1: Option<RubricTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_2: Option<RubricTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_3: Option<RubricTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_4: Option<RubricTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_categories: Option<Vec<String>>,
}

impl ScoringRubric {
    /// Label for a tier number, falling back to the SHIP default.
    pub fn label_for(&self, score: u8) -> String {
        let (tier, default) = match score {
            1 => (&self.score_1, "Accurate and Complete"),
            2 => (&self.score_2, "Substantive but Incomplete"),
            3 => (&self.score_3, "Not Substantive"),
            _ => (&self.score_4, "Incorrect"),
        };
        tier.as_ref()
            .map(|t| t.label.clone())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Complete test scenario with persona, questions, and answer key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub title: String,

    /// When this scenario is valid
    pub effective_date: NaiveDate,

    pub persona: Persona,
    pub scripted_turns: Vec<ScriptedTurn>,

    /// Parameters for generating variations (e.g. allow_paraphrasing)
    #[serde(default)]
    pub variation_knobs: serde_json::Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<AnswerKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_information: Option<PlanInformation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_rubric: Option<ScoringRubric>,

    #[serde(default = "default_rubric_version")]
    pub rubric_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_validity: Option<TemporalValidity>,

    #[serde(default)]
    pub target_parameters: TargetParameters,
}

fn default_rubric_version() -> String {
    "1.0".to_string()
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ElenchusError::Configuration(format!("cannot read scenario {}: {e}", path.display()))
        })?;
        let scenario: Scenario = serde_json::from_str(&content).map_err(|e| {
            ElenchusError::Configuration(format!("malformed scenario {}: {e}", path.display()))
        })?;
        Ok(scenario)
    }

    /// Save the scenario to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether the scenario permits LLM paraphrasing of scripted turns.
    pub fn allows_paraphrasing(&self) -> bool {
        self.variation_knobs
            .get("allow_paraphrasing")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Validate the scenario before a trial starts.
    ///
    /// Checks: scripted turns present with unique ids, and (when an answer
    /// key exists) required/optional point ids all resolve to canonical
    /// facts with unique fact ids.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ElenchusError::InvalidScenario {
            scenario_id: self.scenario_id.clone(),
            reason,
        };

        if self.scenario_id.is_empty() {
            return Err(invalid("scenario_id is empty".into()));
        }
        if self.scripted_turns.is_empty() {
            return Err(invalid("no scripted turns".into()));
        }

        let mut turn_ids = HashSet::new();
        for turn in &self.scripted_turns {
            if !turn_ids.insert(turn.turn_id.as_str()) {
                return Err(invalid(format!("duplicate turn_id '{}'", turn.turn_id)));
            }
            if turn.user_message.trim().is_empty() {
                return Err(invalid(format!("turn '{}' has an empty message", turn.turn_id)));
            }
        }

        if let Some(key) = &self.answer_key {
            let mut fact_ids = HashSet::new();
            for fact in &key.canonical_facts {
                if !fact_ids.insert(fact.fact_id.as_str()) {
                    return Err(invalid(format!("duplicate fact_id '{}'", fact.fact_id)));
                }
            }
            for point in key.required_points.iter().chain(&key.optional_enrichments) {
                if !fact_ids.contains(point.as_str()) {
                    return Err(invalid(format!(
                        "answer key references unknown fact_id '{point}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A small Medicare-only scenario with a partitioned answer key,
    /// shared by agent / scoring / orchestrator tests.
    pub fn sample_scenario() -> Scenario {
        let facts = vec![
            fact("F1_MA", "Medicare Advantage is private insurance that bundles Parts A, B, and usually D", FactSeverity::High),
            fact("F2_MA", "Medicare Advantage plans use provider networks and may require in-network doctors", FactSeverity::High),
            fact("F3_MA", "Medicare Advantage has a yearly out-of-pocket maximum for cost protection", FactSeverity::Medium),
            fact("F1_TM", "Part A covers hospital stays, skilled nursing facility care, hospice, and some home health care", FactSeverity::High),
            fact("F2_TM", "Part B covers doctor visits, outpatient care, medical equipment, and preventive services", FactSeverity::High),
            fact("F3_TM", "With Original Medicare you can see any provider that accepts Medicare", FactSeverity::Medium),
            fact("F4_TM", "Original Medicare needs a separate Part D plan for prescription drug coverage", FactSeverity::Medium),
        ];
        let required: Vec<String> = facts.iter().map(|f| f.fact_id.clone()).collect();

        Scenario {
            scenario_id: "scenario_ma_vs_tm".into(),
            title: "Medicare Advantage vs Original Medicare".into(),
            effective_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            persona: Persona {
                age: 64,
                location: "Toledo, OH".into(),
                current_coverage: "Employer plan ending at 65".into(),
                situation: "Turning 65 next month, comparing coverage options".into(),
                primary_care_physician: Some("Dr. Ellen Park".into()),
            },
            scripted_turns: vec![ScriptedTurn {
                turn_id: "Q1".into(),
                question_number: Some(3),
                user_message: "How are Medicare Advantage Plans different from regular Medicare, and what are good and bad about them?".into(),
                expected_topics: vec!["networks".into(), "costs".into()],
                conditional_next: Default::default(),
            }],
            variation_knobs: Default::default(),
            answer_key: Some(AnswerKey {
                canonical_facts: facts,
                required_points: required,
                optional_enrichments: vec![],
                disallowed_claims: vec![
                    "always better than Original Medicare".into(),
                    "all doctors accept Medicare Advantage".into(),
                ],
                acceptable_referrals: vec![
                    "Compare plans at Medicare.gov".into(),
                    "Call 1-800-MEDICARE".into(),
                ],
            }),
            plan_information: None,
            scoring_rubric: Some(ScoringRubric {
                score_1: Some(RubricTier {
                    label: "Accurate and Complete".into(),
                    criteria: vec!["All MA topics and all TM topics substantively covered".into()],
                    ship_reference: Some("eAppendix 4, QG10".into()),
                }),
                score_2: Some(RubricTier {
                    label: "Substantive but Incomplete".into(),
                    criteria: vec!["Some but not all topics covered".into()],
                    ship_reference: None,
                }),
                score_3: Some(RubricTier {
                    label: "Not Substantive".into(),
                    criteria: vec!["No topics substantively covered".into()],
                    ship_reference: None,
                }),
                score_4: Some(RubricTier {
                    label: "Incorrect".into(),
                    criteria: vec!["Materially incorrect information".into()],
                    ship_reference: None,
                }),
                fact_categories: Some(vec!["_MA".into(), "_TM".into()]),
            }),
            rubric_version: "1.0".into(),
            temporal_validity: None,
            target_parameters: TargetParameters::default(),
        }
    }

    fn fact(id: &str, statement: &str, severity: FactSeverity) -> CanonicalFact {
        CanonicalFact {
            fact_id: id.into(),
            statement: statement.into(),
            rationale: "Per CMS Medicare & You handbook".into(),
            source: "medicare.gov".into(),
            severity_if_wrong: severity,
        }
    }
}
