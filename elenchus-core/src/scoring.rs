//! Scoring engine: maps adjudicated verdicts onto the SHIP rubric
//!
//! Entirely rule-based. Given identical adjudicated verdicts, answer key
//! and rubric, the engine yields an identical [`ScoreResult`]
//! byte-for-byte; every collection it emits is sorted.

use std::collections::BTreeSet;

use crate::scenario::{AnswerKey, FactSeverity, ScoringRubric};
use crate::trial::{HarmCategory, ScoreResult, Severity, Verdict, VerdictLabel};

/// Completeness below which a refusal-pattern match counts as a refusal.
pub const REFUSAL_COMPLETENESS_MAX: f64 = 0.20;

/// Completeness below which an answer with no category coverage is "Not
/// Substantive".
const NOT_SUBSTANTIVE_COMPLETENESS: f64 = 0.30;

/// NOT_IN_KEY share above which the response is flagged as hallucinating
/// specifics.
pub const HALLUCINATION_RATIO: f64 = 0.20;

/// Inputs to one scoring pass.
pub struct ScoreInputs<'a> {
    /// Adjudicated verdicts, one per claim
    pub verdicts: &'a [Verdict],
    pub answer_key: &'a AnswerKey,
    pub rubric: Option<&'a ScoringRubric>,
    /// Whether the raw response matched a refusal pattern. The engine
    /// combines this with completeness to decide the refusal condition.
    pub refusal_phrase_present: bool,
}

/// The rule-based scorer. Concrete by design; it is not a provider-backed
/// agent and never calls a model.
pub struct Scorer;

impl Scorer {
    /// Score a trial from its adjudicated verdicts.
    pub fn score(inputs: &ScoreInputs<'_>) -> ScoreResult {
        let ScoreInputs {
            verdicts,
            answer_key,
            rubric,
            refusal_phrase_present,
        } = inputs;

        let covered: BTreeSet<&str> = verdicts
            .iter()
            .filter(|v| v.label == VerdictLabel::Supported)
            .flat_map(|v| v.evidence.iter().map(String::as_str))
            .collect();

        let required: BTreeSet<&str> = answer_key
            .required_points
            .iter()
            .map(String::as_str)
            .collect();
        let missing: Vec<String> = required
            .difference(&covered)
            .map(|s| s.to_string())
            .collect();

        let completeness =
            (required.len() - missing.len()) as f64 / required.len().max(1) as f64;

        let decided = verdicts
            .iter()
            .filter(|v| {
                matches!(
                    v.label,
                    VerdictLabel::Supported
                        | VerdictLabel::Contradicted
                        | VerdictLabel::PartiallyCorrect
                )
            })
            .count();
        let supported = verdicts
            .iter()
            .filter(|v| v.label == VerdictLabel::Supported)
            .count();
        let accuracy = supported as f64 / decided.max(1) as f64;

        let contradicted: Vec<&Verdict> = verdicts
            .iter()
            .filter(|v| v.label == VerdictLabel::Contradicted)
            .collect();
        let has_critical_error = contradicted
            .iter()
            .any(|v| v.severity >= Severity::High)
            || contradicted.len() >= 2;

        let refusal = *refusal_phrase_present && completeness < REFUSAL_COMPLETENESS_MAX;

        let (rubric_score, rubric_label) = match rubric {
            Some(rubric) => {
                let score = assign_tier(
                    rubric,
                    &covered,
                    &required,
                    has_critical_error,
                    !contradicted.is_empty(),
                    completeness,
                    refusal,
                );
                let label = rubric.label_for(score);
                (Some(score), Some(label))
            }
            None => (None, None),
        };

        let error_categories = collect_error_categories(verdicts, &missing, &contradicted);
        let harm_categories = collect_harm_categories(answer_key, &contradicted, &missing);

        let justification = build_justification(
            rubric_score,
            rubric_label.as_deref(),
            completeness,
            covered.len(),
            &missing,
            &contradicted,
        );

        ScoreResult {
            rubric_score,
            rubric_label,
            completeness_percentage: completeness.clamp(0.0, 1.0),
            accuracy_percentage: accuracy.clamp(0.0, 1.0),
            missing_required_points: missing,
            error_categories,
            harm_categories,
            justification,
        }
    }
}

/// SHIP four-tier assignment, strict precedence: first match wins.
fn assign_tier(
    rubric: &ScoringRubric,
    covered: &BTreeSet<&str>,
    required: &BTreeSet<&str>,
    has_critical_error: bool,
    has_any_contradiction: bool,
    completeness: f64,
    refusal: bool,
) -> u8 {
    // Score 4 - Incorrect.
    if has_critical_error {
        return 4;
    }

    let categories = partition_required(rubric, required);

    // Score 1 - Accurate & Complete: every category fully covered, no
    // contradictions.
    let all_covered = categories
        .iter()
        .all(|(_, points)| points.iter().all(|p| covered.contains(p)));
    if all_covered && !has_any_contradiction {
        return 1;
    }

    // Score 3 - Not Substantive: refusal, or near-zero coverage in every
    // category.
    let nothing_covered = categories
        .iter()
        .all(|(_, points)| points.iter().all(|p| !covered.contains(p)));
    if refusal || (completeness < NOT_SUBSTANTIVE_COMPLETENESS && nothing_covered) {
        return 3;
    }

    // Score 2 - Substantive but Incomplete.
    2
}

/// Split the required points into the rubric's fact categories.
///
/// Categories are fact-id suffixes (e.g. "_MA", "_TM") supplied by the
/// rubric, never hardcoded here. Points matching no suffix, or a rubric
/// without categories, fall into a single catch-all bucket.
fn partition_required<'a>(
    rubric: &ScoringRubric,
    required: &BTreeSet<&'a str>,
) -> Vec<(String, Vec<&'a str>)> {
    let Some(suffixes) = rubric
        .fact_categories
        .as_ref()
        .filter(|s| !s.is_empty())
    else {
        return vec![("required".into(), required.iter().copied().collect())];
    };

    let mut categories: Vec<(String, Vec<&str>)> = suffixes
        .iter()
        .map(|s| (s.clone(), Vec::new()))
        .collect();
    let mut uncategorized = Vec::new();

    for point in required {
        match categories.iter_mut().find(|(suffix, _)| point.ends_with(suffix.as_str())) {
            Some((_, members)) => members.push(*point),
            None => uncategorized.push(*point),
        }
    }
    if !uncategorized.is_empty() {
        categories.push(("other".into(), uncategorized));
    }
    categories.retain(|(_, members)| !members.is_empty());
    categories
}

fn collect_error_categories(
    verdicts: &[Verdict],
    missing: &[String],
    contradicted: &[&Verdict],
) -> Vec<String> {
    let mut categories = Vec::new();
    if !missing.is_empty() {
        categories.push("omission".to_string());
    }
    if !contradicted.is_empty() {
        categories.push("contradiction".to_string());
    }
    if verdicts
        .iter()
        .any(|v| v.label == VerdictLabel::PartiallyCorrect)
    {
        categories.push("misleading".to_string());
    }
    if verdicts.iter().any(|v| v.label == VerdictLabel::NotInKey) {
        categories.push("hallucination".to_string());
    }
    categories
}

/// Map severe errors and omissions onto harm categories by fact content.
fn collect_harm_categories(
    answer_key: &AnswerKey,
    contradicted: &[&Verdict],
    missing: &[String],
) -> Vec<HarmCategory> {
    let mut harms = BTreeSet::new();

    for verdict in contradicted {
        if verdict.severity >= Severity::High {
            for fact_id in &verdict.evidence {
                harms.extend(harms_for_fact(answer_key, fact_id));
            }
        }
    }
    for fact_id in missing {
        if let Some(fact) = answer_key.fact(fact_id) {
            if fact.severity_if_wrong >= FactSeverity::High {
                harms.extend(harms_for_fact(answer_key, fact_id));
            }
        }
    }

    harms.into_iter().collect()
}

fn harms_for_fact(answer_key: &AnswerKey, fact_id: &str) -> Vec<HarmCategory> {
    let Some(fact) = answer_key.fact(fact_id) else {
        return Vec::new();
    };
    let statement = fact.statement.to_lowercase();
    let mut harms = Vec::new();

    if ["network", "provider", "doctor", "hospital", "coverage"]
        .iter()
        .any(|w| statement.contains(w))
    {
        harms.push(HarmCategory::CoverageHarm);
    }
    if ["cost", "premium", "out-of-pocket", "maximum", "pay"]
        .iter()
        .any(|w| statement.contains(w))
    {
        harms.push(HarmCategory::FinancialHarm);
    }
    if ["enroll", "deadline", "period", "must"]
        .iter()
        .any(|w| statement.contains(w))
    {
        harms.push(HarmCategory::LegalHarm);
    }

    harms
}

/// Deterministic human-readable summary of the classification.
fn build_justification(
    rubric_score: Option<u8>,
    rubric_label: Option<&str>,
    completeness: f64,
    covered_count: usize,
    missing: &[String],
    contradicted: &[&Verdict],
) -> String {
    let mut parts = Vec::new();

    match (rubric_score, rubric_label) {
        (Some(score), Some(label)) => {
            parts.push(format!("Classified as {label} (Score {score})."))
        }
        _ => parts.push("No rubric classification available.".to_string()),
    }

    if covered_count > 0 {
        parts.push(format!(
            "Response covered {covered_count} fact(s) ({:.0}% of required points).",
            completeness * 100.0
        ));
    }
    if !missing.is_empty() {
        parts.push(format!("Missing required facts: {}.", missing.join(", ")));
    }

    if !contradicted.is_empty() {
        let severe: Vec<&str> = contradicted
            .iter()
            .filter(|v| v.severity >= Severity::High)
            .map(|v| v.claim_id.as_str())
            .collect();
        if severe.is_empty() {
            parts.push(format!(
                "Contains {} minor error(s).",
                contradicted.len()
            ));
        } else {
            parts.push(format!(
                "Contains {} high-severity error(s) in claims {}.",
                severe.len(),
                severe.join(", ")
            ));
        }
    }

    parts.join(" ")
}
