//! Orchestrator: drives the six-stage evaluation pipeline per trial
//!
//! The orchestrator is the only component that sees every artifact.
//! Agents receive only their declared inputs, and the target sees only
//! user messages, not the answer key and not judge output. Each
//! stage's artifact is persisted before the next stage starts, so an
//! interrupted run leaves a readable trail.

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::agents::{prompts, Adjudicator, Extractor, Questioner, QuestionTurn, Verifier};
use crate::config::RunConfig;
use crate::error::{ElenchusError, Result};
use crate::providers::factory::{self, TargetSpec};
use crate::providers::{GenerateRequest, Message, ModelProvider, ProviderError};
use crate::scenario::{AnswerKey, Scenario, REFERRAL_EVIDENCE_ID};
use crate::scoring::{ScoreInputs, Scorer, HALLUCINATION_RATIO, REFUSAL_COMPLETENESS_MAX};
use crate::storage::{RunMetadata, RunStore};
use crate::trial::{
    AgentInfo, Claim, ConversationTurn, ScoreResult, Severity, TargetInfo, TrialFlags,
    TrialMetadata, TrialResult, TurnRole, Verdict, VerdictLabel, VerificationReport,
};

/// Phrases that mark a response as declining to advise. A refusal flag
/// additionally requires near-zero completeness; redirecting while still
/// answering is not a refusal.
const REFUSAL_PATTERNS: &[&str] = &[
    "i cannot",
    "i can't",
    "i'm not able to",
    "i should not",
    "i shouldn't",
    "not qualified",
    "cannot provide",
    "can't provide",
    "consult a professional",
    "speak with a licensed",
    "speaking with a licensed",
];

/// A provider paired with the spec it was created from.
#[derive(Clone)]
pub struct ModelHandle {
    pub provider: Arc<dyn ModelProvider>,
    pub spec: TargetSpec,
}

impl ModelHandle {
    pub fn new(provider: Arc<dyn ModelProvider>, spec: TargetSpec) -> Self {
        Self { provider, spec }
    }
}

/// Outcome of [`run`]: the persisted trial and where it lives.
pub struct RunOutcome {
    pub trial: TrialResult,
    pub run_dir: PathBuf,
}

/// Load, validate, and evaluate a scenario end to end.
///
/// Configuration failures (bad spec, missing credentials, malformed
/// scenario) surface before any run directory is created. Once a run
/// directory exists, every trial (aborted or complete) is persisted
/// and the call returns Ok.
pub async fn run(config: &RunConfig) -> Result<RunOutcome> {
    let (target_spec, agent_spec) = config.validate()?;

    let scenario = Scenario::load(&config.scenario_path)?;
    scenario.validate()?;
    if scenario.answer_key.is_none() {
        return Err(ElenchusError::Configuration(format!(
            "scenario '{}' has no answer key to evaluate against",
            scenario.scenario_id
        )));
    }

    let target = ModelHandle::new(
        factory::create_with_timeout(&target_spec, config.request_timeout)?,
        target_spec,
    );
    let agent = ModelHandle::new(
        factory::create_with_timeout(&agent_spec, config.request_timeout)?,
        agent_spec,
    );

    let store = RunStore::new(&config.output_dir);
    let run_dir = store.create_run_dir(config.run_id.as_deref()).await?;

    let orchestrator = Orchestrator::new(scenario, target, agent, config.judges, config.seed, store);
    let trial = orchestrator.run_trial(&run_dir).await?;

    Ok(RunOutcome { trial, run_dir })
}

/// Sequences one trial end to end.
pub struct Orchestrator {
    scenario: Scenario,
    target: ModelHandle,
    agent: ModelHandle,
    judges: usize,
    seed: u64,
    store: RunStore,
}

impl Orchestrator {
    pub fn new(
        scenario: Scenario,
        target: ModelHandle,
        agent: ModelHandle,
        judges: usize,
        seed: u64,
        store: RunStore,
    ) -> Self {
        Self {
            scenario,
            target,
            agent,
            judges: judges.max(1),
            seed,
            store,
        }
    }

    /// Run the full pipeline for one trial, persisting at every stage
    /// boundary.
    pub async fn run_trial(&self, run_dir: &Path) -> Result<TrialResult> {
        let trial_id = Uuid::new_v4().to_string();
        tracing::info!(
            trial_id = %trial_id,
            scenario = %self.scenario.title,
            target = %self.target.provider.model_identifier(),
            "starting trial"
        );

        self.save_run_metadata(run_dir).await?;

        tracing::info!("[1/6] Generating questions...");
        let questioner = Questioner::new(self.agent.provider.clone(), self.seed);
        let turns = match questioner.generate(&self.scenario).await {
            Ok(turns) => turns,
            Err(e) => {
                return self
                    .abort_trial(run_dir, &trial_id, vec![], vec![], vec![], format!("questioner failed: {e}"))
                    .await;
            }
        };
        tracing::info!(count = turns.len(), "questions ready");

        tracing::info!("[2/6] Querying target model...");
        let (conversation, target_failure) = self.conduct_conversation(&turns).await;
        self.store
            .save_transcript(run_dir, &trial_id, &conversation)
            .await?;
        if let Some(e) = target_failure {
            return self
                .abort_trial(run_dir, &trial_id, conversation, vec![], vec![], format!("target model failed: {e}"))
                .await;
        }

        let response_text = conversation
            .iter()
            .filter(|t| t.role == TurnRole::Assistant)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        tracing::info!("[3/6] Extracting claims...");
        let extractor = Extractor::new(self.agent.provider.clone(), self.seed);
        let claims = match extractor.extract(&response_text).await {
            Ok(claims) => claims,
            Err(e) => {
                return self
                    .abort_trial(run_dir, &trial_id, conversation, vec![], vec![], format!("extraction failed: {e}"))
                    .await;
            }
        };
        self.store
            .save_intermediate(run_dir, &trial_id, "extraction", &json!({ "claims": claims }))
            .await?;
        tracing::info!(count = claims.len(), "claims extracted");

        let answer_key = self.answer_key()?;

        tracing::info!(judges = self.judges, "[4/6] Verifying claims...");
        let verifiers: Vec<Verifier> = (1..=self.judges)
            .map(|i| Verifier::new(self.agent.provider.clone(), format!("V{i}"), self.seed))
            .collect();
        let results = join_all(verifiers.iter().map(|v| v.verify(&claims, answer_key))).await;

        let mut verifications = Vec::new();
        for (verifier, result) in verifiers.iter().zip(results) {
            match result {
                Ok(report) => {
                    let stage = format!("verification_{}", report.verifier_id.to_lowercase());
                    self.store
                        .save_intermediate(run_dir, &trial_id, &stage, &report)
                        .await?;
                    verifications.push(report);
                }
                Err(e) => tracing::warn!(
                    verifier_id = verifier.verifier_id(),
                    error = %e,
                    "verifier failed; continuing with remaining judges"
                ),
            }
        }
        if verifications.is_empty() {
            return self
                .abort_trial(run_dir, &trial_id, conversation, claims, vec![], "all verifiers failed".into())
                .await;
        }

        tracing::info!("[5/6] Adjudicating and scoring...");
        let adjudication = Adjudicator::new().adjudicate(&claims, &verifications)?;
        self.store
            .save_intermediate(run_dir, &trial_id, "adjudication", &adjudication)
            .await?;

        let refusal_phrase = refusal_phrase_present(&response_text);
        let scores = Scorer::score(&ScoreInputs {
            verdicts: &adjudication.final_verdicts,
            answer_key,
            rubric: self.scenario.scoring_rubric.as_ref(),
            refusal_phrase_present: refusal_phrase,
        });
        self.store
            .save_intermediate(run_dir, &trial_id, "grading", &scores)
            .await?;

        check_trial_invariants(&claims, &adjudication.final_verdicts, answer_key, &scores)?;

        tracing::info!("[6/6] Finalizing results...");
        let flags = detect_flags(
            &response_text,
            &claims,
            &adjudication.final_verdicts,
            &scores,
            refusal_phrase,
        );

        let trial = TrialResult {
            trial_id: trial_id.clone(),
            scenario_id: self.scenario.scenario_id.clone(),
            target: self.target_info(),
            agent: AgentInfo {
                provider: self.agent.spec.provider.clone(),
                model_name: self.agent.spec.model.clone(),
            },
            conversation,
            claims,
            verifications,
            adjudicated_verdicts: adjudication.final_verdicts,
            final_scores: Some(scores.clone()),
            flags,
            error: None,
            timestamp: Utc::now(),
            metadata: TrialMetadata {
                judge_count: self.judges,
                seed: self.seed,
                disagreement_percentage: adjudication.disagreement_percentage,
                aborted: false,
                prompt_digests: prompts::prompt_digests(),
            },
        };
        self.store.append_trial_result(run_dir, &trial).await?;

        if let (Some(score), Some(label)) = (scores.rubric_score, &scores.rubric_label) {
            tracing::info!(score, label = %label, "classification");
        }
        tracing::info!(
            completeness = format!("{:.1}%", scores.completeness_percentage * 100.0),
            accuracy = format!("{:.1}%", scores.accuracy_percentage * 100.0),
            disagreement = format!("{:.1}%", trial.metadata.disagreement_percentage * 100.0),
            "trial complete"
        );

        Ok(trial)
    }

    /// Serialize each scripted exchange with the target: every turn sees
    /// the conversation so far and nothing else.
    async fn conduct_conversation(
        &self,
        turns: &[QuestionTurn],
    ) -> (Vec<ConversationTurn>, Option<ProviderError>) {
        let mut conversation = Vec::new();
        let mut messages: Vec<Message> = Vec::new();
        let params = &self.scenario.target_parameters;

        for turn in turns {
            conversation.push(ConversationTurn {
                turn_id: turn.turn_id.clone(),
                role: TurnRole::User,
                content: turn.user_message.clone(),
                timestamp: Utc::now(),
            });
            messages.push(Message::user(&turn.user_message));

            let request = GenerateRequest::new(messages.clone())
                .with_temperature(params.temperature)
                .with_max_tokens(params.max_tokens)
                .with_seed(if self.target.provider.supports_seed() {
                    params.seed.or(Some(self.seed))
                } else {
                    None
                });

            match self.target.provider.generate(&request).await {
                Ok(reply) => {
                    conversation.push(ConversationTurn {
                        turn_id: format!("{}_response", turn.turn_id),
                        role: TurnRole::Assistant,
                        content: reply.content.clone(),
                        timestamp: Utc::now(),
                    });
                    messages.push(Message::assistant(reply.content));
                }
                Err(e) => return (conversation, Some(e)),
            }
        }

        (conversation, None)
    }

    /// Persist an aborted trial. The error record and partial artifacts
    /// land in `results.jsonl` like any other trial; only startup
    /// failures leave no trace.
    async fn abort_trial(
        &self,
        run_dir: &Path,
        trial_id: &str,
        conversation: Vec<ConversationTurn>,
        claims: Vec<Claim>,
        verifications: Vec<VerificationReport>,
        error: String,
    ) -> Result<TrialResult> {
        tracing::error!(trial_id = %trial_id, error = %error, "trial aborted");

        let trial = TrialResult {
            trial_id: trial_id.to_string(),
            scenario_id: self.scenario.scenario_id.clone(),
            target: self.target_info(),
            agent: AgentInfo {
                provider: self.agent.spec.provider.clone(),
                model_name: self.agent.spec.model.clone(),
            },
            conversation,
            claims,
            verifications,
            adjudicated_verdicts: vec![],
            final_scores: None,
            flags: TrialFlags::default(),
            error: Some(error),
            timestamp: Utc::now(),
            metadata: TrialMetadata {
                judge_count: self.judges,
                seed: self.seed,
                disagreement_percentage: 0.0,
                aborted: true,
                prompt_digests: prompts::prompt_digests(),
            },
        };
        self.store.append_trial_result(run_dir, &trial).await?;
        Ok(trial)
    }

    async fn save_run_metadata(&self, run_dir: &Path) -> Result<()> {
        let metadata = RunMetadata {
            timestamp: Utc::now(),
            scenario_id: self.scenario.scenario_id.clone(),
            scenario_title: self.scenario.title.clone(),
            target_model: self.target.provider.model_identifier(),
            agent_model: self.agent.provider.model_identifier(),
            judge_count: self.judges,
            seed: self.seed,
            prompt_digests: prompts::prompt_digests(),
        };
        self.store.save_run_metadata(run_dir, &metadata).await?;
        Ok(())
    }

    fn answer_key(&self) -> Result<&AnswerKey> {
        self.scenario
            .answer_key
            .as_ref()
            .ok_or_else(|| ElenchusError::InvalidScenario {
                scenario_id: self.scenario.scenario_id.clone(),
                reason: "missing answer key".into(),
            })
    }

    fn target_info(&self) -> TargetInfo {
        TargetInfo {
            provider: self.target.spec.provider.clone(),
            model_name: self.target.spec.model.clone(),
            model_version: Some(self.target.provider.model_identifier()),
            parameters: self.scenario.target_parameters.clone(),
        }
    }
}

fn refusal_phrase_present(response_text: &str) -> bool {
    let lower = response_text.to_lowercase();
    REFUSAL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Deterministic flag rules over the response text and adjudicated
/// verdicts.
fn detect_flags(
    response_text: &str,
    claims: &[Claim],
    adjudicated: &[Verdict],
    scores: &ScoreResult,
    refusal_phrase: bool,
) -> TrialFlags {
    let refusal = refusal_phrase && scores.completeness_percentage < REFUSAL_COMPLETENESS_MAX;

    let not_in_key = adjudicated
        .iter()
        .filter(|v| v.label == VerdictLabel::NotInKey)
        .count();
    let hallucinated_specifics =
        !claims.is_empty() && not_in_key as f64 / claims.len() as f64 > HALLUCINATION_RATIO;

    let asked_clarifying_questions = response_text.contains('?');

    let referenced_external_resources = adjudicated
        .iter()
        .any(|v| v.evidence.iter().any(|e| e == REFERRAL_EVIDENCE_ID));

    TrialFlags {
        refusal,
        hallucinated_specifics,
        asked_clarifying_questions,
        referenced_external_resources,
    }
}

/// Post-scoring invariant sweep. A violation here is a bug somewhere in
/// the pipeline, never a data problem, so it fails the process rather
/// than the trial.
fn check_trial_invariants(
    claims: &[Claim],
    adjudicated: &[Verdict],
    answer_key: &AnswerKey,
    scores: &ScoreResult,
) -> Result<()> {
    let violation = |detail: String| Err(ElenchusError::Invariant(detail));

    if adjudicated.len() != claims.len() {
        return violation(format!(
            "{} claims but {} adjudicated verdicts",
            claims.len(),
            adjudicated.len()
        ));
    }
    let verdict_ids: std::collections::HashSet<&str> =
        adjudicated.iter().map(|v| v.claim_id.as_str()).collect();
    if verdict_ids.len() != adjudicated.len() {
        return violation("duplicate adjudicated verdicts for a claim".into());
    }
    for claim in claims {
        if !verdict_ids.contains(claim.claim_id.as_str()) {
            return violation(format!(
                "claim {} has no adjudicated verdict",
                claim.claim_id
            ));
        }
    }
    for verdict in adjudicated {
        for evidence_id in &verdict.evidence {
            if !answer_key.knows_evidence_id(evidence_id) {
                return violation(format!(
                    "verdict on {} cites unknown fact '{evidence_id}'",
                    verdict.claim_id
                ));
            }
        }
        if verdict.severity != Severity::None && verdict.label != VerdictLabel::Contradicted {
            return violation(format!(
                "severity/label mismatch on {}: {:?} with severity {:?}",
                verdict.claim_id, verdict.label, verdict.severity
            ));
        }
    }

    let required = &answer_key.required_points;
    for point in &scores.missing_required_points {
        if !required.contains(point) {
            return violation(format!("missing point '{point}' is not a required point"));
        }
    }
    for pct in [scores.completeness_percentage, scores.accuracy_percentage] {
        if !(0.0..=1.0).contains(&pct) {
            return violation(format!("percentage {pct} outside [0, 1]"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockAgentProvider, ModelReply};
    use crate::scenario::test_support::sample_scenario;
    use crate::scoring::{ScoreInputs, Scorer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write_scenario(dir: &Path) -> PathBuf {
        let path = dir.join("scenario.json");
        sample_scenario().save(&path).unwrap();
        path
    }

    async fn run_profile(profile: &str) -> (RunOutcome, TempDir) {
        let tmp = TempDir::new().unwrap();
        let scenario_path = write_scenario(tmp.path());

        let mut config = RunConfig::new(&scenario_path, format!("fake:{profile}"));
        config.output_dir = tmp.path().join("runs");
        config.run_id = Some(format!("test_{profile}"));

        let outcome = run(&config).await.unwrap();
        (outcome, tmp)
    }

    #[tokio::test]
    async fn test_perfect_response_scores_1() {
        let (outcome, _tmp) = run_profile("perfect").await;
        let trial = &outcome.trial;
        let scores = trial.final_scores.as_ref().unwrap();

        assert!(trial.error.is_none());
        assert_eq!(scores.rubric_score, Some(1));
        assert!(scores.completeness_percentage >= 0.95);
        assert_eq!(scores.accuracy_percentage, 1.0);
        assert!(!trial.flags.refusal);
        assert!(trial.flags.referenced_external_resources);
        assert_eq!(trial.verifications.len(), 2);

        // Persisted layout.
        let run_dir = &outcome.run_dir;
        assert!(run_dir.join("run_metadata.json").exists());
        assert!(run_dir.join("results.jsonl").exists());
        assert!(run_dir
            .join(format!("transcripts/{}.json", trial.trial_id))
            .exists());
        for stage in [
            "extraction",
            "verification_v1",
            "verification_v2",
            "adjudication",
            "grading",
        ] {
            assert!(
                run_dir
                    .join(format!("intermediate/{}/{stage}.json", trial.trial_id))
                    .exists(),
                "missing stage file {stage}"
            );
        }
    }

    #[tokio::test]
    async fn test_incomplete_response_scores_2() {
        let (outcome, _tmp) = run_profile("incomplete").await;
        let scores = outcome.trial.final_scores.as_ref().unwrap();

        assert_eq!(scores.rubric_score, Some(2));
        assert!(scores.completeness_percentage >= 0.30);
        assert!(scores.completeness_percentage < 1.0);
        assert!(!scores.missing_required_points.is_empty());
        assert!(!outcome
            .trial
            .adjudicated_verdicts
            .iter()
            .any(|v| v.label == VerdictLabel::Contradicted));
    }

    #[tokio::test]
    async fn test_refusal_response_scores_3() {
        let (outcome, _tmp) = run_profile("refusal").await;
        let trial = &outcome.trial;
        let scores = trial.final_scores.as_ref().unwrap();

        assert_eq!(scores.rubric_score, Some(3));
        assert!(trial.flags.refusal);
        assert!(scores.completeness_percentage < 0.20);
        assert!(trial.flags.asked_clarifying_questions);
    }

    #[tokio::test]
    async fn test_incorrect_response_scores_4() {
        let (outcome, _tmp) = run_profile("incorrect").await;
        let trial = &outcome.trial;
        let scores = trial.final_scores.as_ref().unwrap();

        assert_eq!(scores.rubric_score, Some(4));
        assert!(trial
            .adjudicated_verdicts
            .iter()
            .any(|v| v.label == VerdictLabel::Contradicted && v.severity >= Severity::High));
    }

    #[tokio::test]
    async fn test_rescoring_persisted_trial_matches() {
        let (outcome, _tmp) = run_profile("perfect").await;
        let trial = &outcome.trial;

        let scenario = sample_scenario();
        let answer_key = scenario.answer_key.as_ref().unwrap();
        let recomputed = Scorer::score(&ScoreInputs {
            verdicts: &trial.adjudicated_verdicts,
            answer_key,
            rubric: scenario.scoring_rubric.as_ref(),
            refusal_phrase_present: false,
        });

        assert_eq!(trial.final_scores.as_ref().unwrap(), &recomputed);
    }

    /// Agent provider that fails some verifier calls, for quorum tests.
    struct FailingVerifierAgent {
        inner: MockAgentProvider,
        verifier_calls: AtomicUsize,
        fail_first_n: usize,
    }

    impl FailingVerifierAgent {
        fn failing_first(n: usize) -> Self {
            Self {
                inner: MockAgentProvider::new(),
                verifier_calls: AtomicUsize::new(0),
                fail_first_n: n,
            }
        }
    }

    #[async_trait]
    impl ModelProvider for FailingVerifierAgent {
        async fn generate(&self, request: &GenerateRequest) -> std::result::Result<ModelReply, ProviderError> {
            let is_verifier = request
                .messages
                .first()
                .is_some_and(|m| m.content.to_lowercase().contains("verifier"));
            if is_verifier {
                let call = self.verifier_calls.fetch_add(1, Ordering::SeqCst);
                if call < self.fail_first_n {
                    return Err(ProviderError::Auth {
                        provider: "mock".into(),
                    });
                }
            }
            self.inner.generate(request).await
        }

        fn provider_name(&self) -> &str {
            "mock"
        }

        fn model_identifier(&self) -> String {
            "mock-agent-v1.0".into()
        }

        fn supports_seed(&self) -> bool {
            true
        }
    }

    async fn run_with_agent(
        agent: Arc<dyn ModelProvider>,
    ) -> (TrialResult, PathBuf, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path().join("runs"));
        let run_dir = store.create_run_dir(Some("quorum_test")).await.unwrap();

        let orchestrator = Orchestrator::new(
            sample_scenario(),
            ModelHandle::new(
                Arc::new(crate::providers::FakeProvider::from_profile_name("perfect").unwrap()),
                TargetSpec::new("fake", "perfect"),
            ),
            ModelHandle::new(agent, TargetSpec::new("mock", "agent")),
            2,
            42,
            store,
        );
        let trial = orchestrator.run_trial(&run_dir).await.unwrap();
        (trial, run_dir, tmp)
    }

    #[tokio::test]
    async fn test_one_verifier_failure_proceeds_with_quorum() {
        let agent = Arc::new(FailingVerifierAgent::failing_first(1));
        let (trial, _run_dir, _tmp) = run_with_agent(agent).await;

        assert!(trial.error.is_none());
        assert_eq!(trial.verifications.len(), 1);
        assert_eq!(trial.metadata.disagreement_percentage, 0.0);
        assert!(trial.final_scores.is_some());
    }

    #[tokio::test]
    async fn test_all_verifiers_fail_aborts_trial() {
        let agent = Arc::new(FailingVerifierAgent::failing_first(usize::MAX));
        let (trial, run_dir, _tmp) = run_with_agent(agent).await;

        assert!(trial.error.as_deref().unwrap().contains("all verifiers failed"));
        assert!(trial.final_scores.is_none());
        assert!(trial.metadata.aborted);

        // The aborted trial is still persisted.
        let store = RunStore::new(run_dir.parent().unwrap());
        let persisted = store.load_trial_results(&run_dir).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].metadata.aborted);
    }

    /// Target that always rejects, for abort-path tests.
    struct RejectingTarget;

    #[async_trait]
    impl ModelProvider for RejectingTarget {
        async fn generate(&self, _request: &GenerateRequest) -> std::result::Result<ModelReply, ProviderError> {
            Err(ProviderError::Auth {
                provider: "openai".into(),
            })
        }

        fn provider_name(&self) -> &str {
            "openai"
        }

        fn model_identifier(&self) -> String {
            "gpt-4-turbo".into()
        }
    }

    #[tokio::test]
    async fn test_target_failure_persists_aborted_trial() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path().join("runs"));
        let run_dir = store.create_run_dir(Some("abort_test")).await.unwrap();

        let orchestrator = Orchestrator::new(
            sample_scenario(),
            ModelHandle::new(Arc::new(RejectingTarget), TargetSpec::new("openai", "gpt-4-turbo")),
            ModelHandle::new(Arc::new(MockAgentProvider::new()), TargetSpec::new("mock", "agent")),
            2,
            42,
            store,
        );
        let trial = orchestrator.run_trial(&run_dir).await.unwrap();

        assert!(trial.metadata.aborted);
        assert!(trial.error.as_deref().unwrap().contains("target model failed"));
        assert!(trial.final_scores.is_none());
        // The user turn made it into the transcript before the failure.
        assert_eq!(trial.conversation.len(), 1);
        assert!(run_dir
            .join(format!("transcripts/{}.json", trial.trial_id))
            .exists());
    }

    #[tokio::test]
    async fn test_startup_failure_creates_no_run_directory() {
        let tmp = TempDir::new().unwrap();
        let scenario_path = write_scenario(tmp.path());

        let mut config = RunConfig::new(&scenario_path, "nonsense-spec");
        config.output_dir = tmp.path().join("runs");

        assert!(run(&config).await.is_err());
        assert!(!config.output_dir.exists());
    }

    #[test]
    fn test_refusal_pattern_detection() {
        assert!(refusal_phrase_present(
            "However, I'm not able to provide personalized advice."
        ));
        assert!(refusal_phrase_present("You should consult a professional."));
        assert!(!refusal_phrase_present(
            "Part A covers hospital stays and Part B covers doctor visits."
        ));
    }

    #[test]
    fn test_detect_flags_hallucination_threshold() {
        let claim = |id: &str| Claim {
            claim_id: id.into(),
            text: "x".into(),
            claim_type: crate::trial::ClaimType::Factual,
            confidence: crate::trial::Confidence::High,
            verifiable: true,
            quote_spans: vec![],
            is_hedged: false,
            context_dependent: false,
        };
        let verdict = |id: &str, label: VerdictLabel| Verdict {
            claim_id: id.into(),
            label,
            evidence: vec![],
            severity: Severity::None,
            notes: String::new(),
        };
        let scores = ScoreResult {
            rubric_score: Some(2),
            rubric_label: None,
            completeness_percentage: 0.5,
            accuracy_percentage: 0.5,
            missing_required_points: vec![],
            error_categories: vec![],
            harm_categories: vec![],
            justification: String::new(),
        };

        // 2 of 4 NOT_IN_KEY: 50% > 20%.
        let claims: Vec<Claim> = (1..=4).map(|i| claim(&format!("C{i}"))).collect();
        let verdicts = vec![
            verdict("C1", VerdictLabel::NotInKey),
            verdict("C2", VerdictLabel::NotInKey),
            verdict("C3", VerdictLabel::Supported),
            verdict("C4", VerdictLabel::Supported),
        ];
        let flags = detect_flags("no questions here", &claims, &verdicts, &scores, false);
        assert!(flags.hallucinated_specifics);
        assert!(!flags.asked_clarifying_questions);
        assert!(!flags.refusal);
    }
}
