//! Adjudicator: collapses N judges' verdicts into one verdict per claim
//!
//! Pure majority-vote reduction. Ties break toward the
//! safety-conservative label, severity escalates to the worst
//! contradicted vote, and evidence is the union across the winning side.

use std::collections::{BTreeSet, HashMap};

use crate::error::{ElenchusError, Result};
use crate::trial::{
    AdjudicationReport, Claim, Severity, Verdict, VerdictLabel, VerificationReport,
};

/// Disagreement rate above which a trial is flagged for manual review.
const DISAGREEMENT_THRESHOLD: f64 = 0.20;

/// The adjudicator agent. Rule-based and synchronous; it never calls a
/// model.
pub struct Adjudicator {
    disagreement_threshold: f64,
}

impl Default for Adjudicator {
    fn default() -> Self {
        Self {
            disagreement_threshold: DISAGREEMENT_THRESHOLD,
        }
    }
}

impl Adjudicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            disagreement_threshold: threshold,
        }
    }

    /// Reduce per-judge verdicts to one adjudicated verdict per claim.
    ///
    /// Invariant violations (no reports, a claim with no verdicts) are
    /// bugs and raise loudly. The result is invariant to the order the
    /// verifier reports arrive in.
    pub fn adjudicate(
        &self,
        claims: &[Claim],
        reports: &[VerificationReport],
    ) -> Result<AdjudicationReport> {
        if reports.is_empty() {
            return Err(ElenchusError::Invariant(
                "adjudication requires at least one verification report".into(),
            ));
        }

        if reports.len() == 1 {
            return Ok(AdjudicationReport {
                final_verdicts: reports[0].verdicts.clone(),
                disagreement_percentage: 0.0,
                needs_manual_review: false,
                notes: "Single verifier - no adjudication required.".into(),
            });
        }

        let mut verdict_map: HashMap<&str, Vec<&Verdict>> = claims
            .iter()
            .map(|c| (c.claim_id.as_str(), Vec::new()))
            .collect();
        for report in reports {
            for verdict in &report.verdicts {
                if let Some(entry) = verdict_map.get_mut(verdict.claim_id.as_str()) {
                    entry.push(verdict);
                }
            }
        }

        let mut final_verdicts = Vec::with_capacity(claims.len());
        let mut disagreement_count = 0usize;
        let mut split_decisions = Vec::new();

        for claim in claims {
            let votes = &verdict_map[claim.claim_id.as_str()];
            if votes.is_empty() {
                return Err(ElenchusError::Invariant(format!(
                    "no verdicts found for claim {}",
                    claim.claim_id
                )));
            }

            let resolved = resolve_claim(claim, votes);
            if !resolved.unanimous {
                disagreement_count += 1;
            }
            if resolved.supported_vs_contradicted {
                split_decisions.push(claim.claim_id.clone());
            }
            final_verdicts.push(resolved.verdict);
        }

        let disagreement_percentage = if claims.is_empty() {
            0.0
        } else {
            disagreement_count as f64 / claims.len() as f64
        };

        let has_critical_contradiction = final_verdicts
            .iter()
            .any(|v| v.label == VerdictLabel::Contradicted && v.severity == Severity::Critical);

        let needs_manual_review = disagreement_percentage > self.disagreement_threshold
            || !split_decisions.is_empty()
            || has_critical_contradiction;

        let notes = self.build_notes(
            reports.len(),
            disagreement_percentage,
            disagreement_count,
            &split_decisions,
        );

        Ok(AdjudicationReport {
            final_verdicts,
            disagreement_percentage,
            needs_manual_review,
            notes,
        })
    }

    fn build_notes(
        &self,
        judge_count: usize,
        disagreement_percentage: f64,
        disagreement_count: usize,
        split_decisions: &[String],
    ) -> String {
        let mut parts = vec![
            format!("Adjudicated across {judge_count} verifiers."),
            format!("Disagreement rate: {:.1}%.", disagreement_percentage * 100.0),
        ];

        if disagreement_percentage <= 0.10 {
            parts.push("Strong consensus across verifiers.".into());
        } else if disagreement_percentage <= self.disagreement_threshold {
            parts.push("Moderate consensus - majority vote applied.".into());
        } else {
            parts.push("High disagreement - flagged for manual review.".into());
        }

        if !split_decisions.is_empty() {
            parts.push(format!(
                "Critical disagreements (CONTRADICTED vs SUPPORTED) on claims: {}.",
                split_decisions.join(", ")
            ));
        }
        if disagreement_count > 0 {
            parts.push(format!(
                "Total claims with disagreement: {disagreement_count}."
            ));
        }

        parts.join(" ")
    }
}

struct ResolvedClaim {
    verdict: Verdict,
    unanimous: bool,
    supported_vs_contradicted: bool,
}

/// Majority vote over one claim's verdicts, tie-broken by
/// [`VerdictLabel::tie_break_rank`].
fn resolve_claim(claim: &Claim, votes: &[&Verdict]) -> ResolvedClaim {
    let mut label_counts: HashMap<VerdictLabel, usize> = HashMap::new();
    for vote in votes {
        *label_counts.entry(vote.label).or_insert(0) += 1;
    }

    let winning_label = *label_counts
        .iter()
        .max_by_key(|(label, count)| (**count, label.tie_break_rank()))
        .map(|(label, _)| label)
        .expect("votes is non-empty");

    let unanimous = label_counts.len() == 1;
    let supported_vs_contradicted = label_counts.contains_key(&VerdictLabel::Supported)
        && label_counts.contains_key(&VerdictLabel::Contradicted);

    // Severity escalates to the worst contradicted vote, but only a
    // contradicted outcome carries one.
    let severity = if winning_label == VerdictLabel::Contradicted {
        votes
            .iter()
            .filter(|v| v.label == VerdictLabel::Contradicted)
            .map(|v| v.severity)
            .max()
            .unwrap_or(Severity::None)
    } else {
        Severity::None
    };

    // Evidence: sorted union across the votes that agreed with the
    // winning label. Sorting keeps adjudication byte-stable regardless
    // of judge completion order.
    let evidence: Vec<String> = votes
        .iter()
        .filter(|v| v.label == winning_label)
        .flat_map(|v| v.evidence.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut notes_parts: Vec<String> = votes
        .iter()
        .filter(|v| v.label == winning_label && !v.notes.is_empty())
        .map(|v| v.notes.clone())
        .collect();
    notes_parts.dedup();
    let mut notes = notes_parts.join(" | ");

    if !unanimous {
        let mut summary: Vec<String> = label_counts
            .iter()
            .map(|(label, count)| format!("{}:{count}", serde_label(*label)))
            .collect();
        summary.sort();
        notes = format!("[Disagreement: {}] {notes}", summary.join(", "))
            .trim_end()
            .to_string();
    }

    ResolvedClaim {
        verdict: Verdict {
            claim_id: claim.claim_id.clone(),
            label: winning_label,
            evidence,
            severity,
            notes,
        },
        unanimous,
        supported_vs_contradicted,
    }
}

fn serde_label(label: VerdictLabel) -> &'static str {
    match label {
        VerdictLabel::Supported => "SUPPORTED",
        VerdictLabel::Contradicted => "CONTRADICTED",
        VerdictLabel::NotInKey => "NOT_IN_KEY",
        VerdictLabel::PartiallyCorrect => "PARTIALLY_CORRECT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{ClaimType, Confidence};

    fn claim(id: &str) -> Claim {
        Claim {
            claim_id: id.into(),
            text: format!("claim {id}"),
            claim_type: ClaimType::Factual,
            confidence: Confidence::High,
            verifiable: true,
            quote_spans: vec![],
            is_hedged: false,
            context_dependent: false,
        }
    }

    fn verdict(claim_id: &str, label: VerdictLabel, severity: Severity, evidence: &[&str]) -> Verdict {
        Verdict {
            claim_id: claim_id.into(),
            label,
            evidence: evidence.iter().map(|s| s.to_string()).collect(),
            severity,
            notes: String::new(),
        }
    }

    fn report(verifier_id: &str, verdicts: Vec<Verdict>) -> VerificationReport {
        VerificationReport {
            verifier_id: verifier_id.into(),
            verdicts,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_single_verifier_passthrough() {
        let claims = vec![claim("C1")];
        let reports = vec![report(
            "V1",
            vec![verdict("C1", VerdictLabel::Supported, Severity::None, &["F1"])],
        )];

        let result = Adjudicator::new().adjudicate(&claims, &reports).unwrap();

        assert_eq!(result.disagreement_percentage, 0.0);
        assert!(!result.needs_manual_review);
        assert_eq!(result.final_verdicts.len(), 1);
        assert_eq!(result.final_verdicts[0].label, VerdictLabel::Supported);
    }

    #[test]
    fn test_majority_vote_wins() {
        let claims = vec![claim("C1")];
        let reports = vec![
            report("V1", vec![verdict("C1", VerdictLabel::Supported, Severity::None, &["F1"])]),
            report("V2", vec![verdict("C1", VerdictLabel::Supported, Severity::None, &["F2"])]),
            report("V3", vec![verdict("C1", VerdictLabel::NotInKey, Severity::None, &[])]),
        ];

        let result = Adjudicator::new().adjudicate(&claims, &reports).unwrap();

        assert_eq!(result.final_verdicts[0].label, VerdictLabel::Supported);
        // Evidence is the sorted union over the winning side only.
        assert_eq!(result.final_verdicts[0].evidence, vec!["F1", "F2"]);
        assert!(result.disagreement_percentage > 0.0);
    }

    #[test]
    fn test_tie_breaks_toward_contradicted() {
        let claims = vec![claim("C1")];
        let reports = vec![
            report("V1", vec![verdict("C1", VerdictLabel::Supported, Severity::None, &["F1"])]),
            report("V2", vec![verdict("C1", VerdictLabel::Contradicted, Severity::Medium, &["F2"])]),
        ];

        let result = Adjudicator::new().adjudicate(&claims, &reports).unwrap();

        let adjudicated = &result.final_verdicts[0];
        assert_eq!(adjudicated.label, VerdictLabel::Contradicted);
        assert_eq!(adjudicated.severity, Severity::Medium);
        assert_eq!(adjudicated.evidence, vec!["F2"]);
        assert!(result.disagreement_percentage > 0.0);
        // SUPPORTED vs CONTRADICTED splits always flag manual review.
        assert!(result.needs_manual_review);
    }

    #[test]
    fn test_severity_escalates_to_worst_contradicted_vote() {
        let claims = vec![claim("C1")];
        let reports = vec![
            report("V1", vec![verdict("C1", VerdictLabel::Contradicted, Severity::Low, &["F1"])]),
            report("V2", vec![verdict("C1", VerdictLabel::Contradicted, Severity::Critical, &["F1"])]),
            report("V3", vec![verdict("C1", VerdictLabel::Contradicted, Severity::Medium, &["F2"])]),
        ];

        let result = Adjudicator::new().adjudicate(&claims, &reports).unwrap();

        let adjudicated = &result.final_verdicts[0];
        assert_eq!(adjudicated.severity, Severity::Critical);
        assert_eq!(adjudicated.evidence, vec!["F1", "F2"]);
        assert_eq!(result.disagreement_percentage, 0.0);
        // A critical contradiction flags review even with full agreement.
        assert!(result.needs_manual_review);
    }

    #[test]
    fn test_non_contradicted_majority_keeps_severity_none() {
        let claims = vec![claim("C1")];
        let reports = vec![
            report("V1", vec![verdict("C1", VerdictLabel::Supported, Severity::None, &["F1"])]),
            report("V2", vec![verdict("C1", VerdictLabel::Supported, Severity::None, &["F1"])]),
            report("V3", vec![verdict("C1", VerdictLabel::Contradicted, Severity::High, &["F2"])]),
        ];

        let result = Adjudicator::new().adjudicate(&claims, &reports).unwrap();

        let adjudicated = &result.final_verdicts[0];
        assert_eq!(adjudicated.label, VerdictLabel::Supported);
        assert_eq!(adjudicated.severity, Severity::None);
    }

    #[test]
    fn test_disagreement_threshold_triggers_review() {
        let claims: Vec<Claim> = (1..=4).map(|i| claim(&format!("C{i}"))).collect();
        let split = |id: &str| {
            (
                verdict(id, VerdictLabel::NotInKey, Severity::None, &[]),
                verdict(id, VerdictLabel::PartiallyCorrect, Severity::None, &["F1"]),
            )
        };

        // 2 of 4 claims disagree: 50% > 20% threshold.
        let (a1, b1) = split("C1");
        let (a2, b2) = split("C2");
        let agreed =
            |id: &str| verdict(id, VerdictLabel::NotInKey, Severity::None, &[]);
        let reports = vec![
            report("V1", vec![a1, a2, agreed("C3"), agreed("C4")]),
            report("V2", vec![b1, b2, agreed("C3"), agreed("C4")]),
        ];

        let result = Adjudicator::new().adjudicate(&claims, &reports).unwrap();

        assert_eq!(result.disagreement_percentage, 0.5);
        assert!(result.needs_manual_review);
        assert!(result.notes.contains("manual review"));
    }

    #[test]
    fn test_adjudication_invariant_missing_verdict() {
        let claims = vec![claim("C1"), claim("C2")];
        let reports = vec![
            report("V1", vec![verdict("C1", VerdictLabel::NotInKey, Severity::None, &[])]),
            report("V2", vec![verdict("C1", VerdictLabel::NotInKey, Severity::None, &[])]),
        ];

        let result = Adjudicator::new().adjudicate(&claims, &reports);
        assert!(matches!(result, Err(ElenchusError::Invariant(_))));
    }

    #[test]
    fn test_order_invariance_across_judges() {
        let claims = vec![claim("C1"), claim("C2")];
        let v1 = vec![
            verdict("C1", VerdictLabel::Supported, Severity::None, &["F2", "F1"]),
            verdict("C2", VerdictLabel::NotInKey, Severity::None, &[]),
        ];
        let v2 = vec![
            verdict("C1", VerdictLabel::Supported, Severity::None, &["F3"]),
            verdict("C2", VerdictLabel::NotInKey, Severity::None, &[]),
        ];

        let forward = Adjudicator::new()
            .adjudicate(&claims, &[report("V1", v1.clone()), report("V2", v2.clone())])
            .unwrap();
        let reversed = Adjudicator::new()
            .adjudicate(&claims, &[report("V2", v2), report("V1", v1)])
            .unwrap();

        assert_eq!(
            serde_json::to_string(&forward.final_verdicts).unwrap(),
            serde_json::to_string(&reversed.final_verdicts).unwrap()
        );
        assert_eq!(forward.final_verdicts[0].evidence, vec!["F1", "F2", "F3"]);
    }
}
