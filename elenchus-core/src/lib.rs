//! # elenchus-core
//!
//! Mystery-shopper evaluation pipeline for AI-generated Medicare
//! guidance, reproducing the SHIP (State Health Insurance Assistance
//! Program) study methodology.
//!
//! A trial runs a scripted beneficiary conversation against a target
//! model, decomposes the answers into verifiable claims, judges each
//! claim against the scenario's answer key with N independent
//! verifiers, adjudicates disagreements by majority vote, and assigns a
//! SHIP four-tier score. Every stage's output is persisted append-only
//! under `runs/<run_id>/` for audit.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use elenchus_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RunConfig::new("scenarios/v1/scenario_001.json", "fake:perfect");
//!     let outcome = elenchus_core::orchestrator::run(&config).await?;
//!
//!     println!(
//!         "score: {:?} ({} claims)",
//!         outcome.trial.final_scores.as_ref().and_then(|s| s.rubric_score),
//!         outcome.trial.claims.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Provider adapters** ([`providers`]): one trait over OpenAI,
//!   Anthropic, Gemini, Grok, OpenRouter, plus offline fake/mock
//!   variants; retries with capped backoff, typed errors.
//! - **Agents** ([`agents`]): questioner, extractor, N verifiers, and a
//!   rule-based adjudicator. Role isolation is strict: the target never
//!   sees the answer key, judges never see each other.
//! - **Scoring** ([`scoring`]): deterministic SHIP rubric engine.
//! - **Storage** ([`storage`]): append-only run directories with
//!   atomic writes.
//! - **Orchestrator** ([`orchestrator`]): sequences the six stages and
//!   persists at every boundary.

pub mod agents;
pub mod coerce;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod scenario;
pub mod scoring;
pub mod storage;
pub mod trial;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agents::{Adjudicator, Extractor, Questioner, Verifier};
    pub use crate::coerce::{coerce_json, CoerceError};
    pub use crate::config::RunConfig;
    pub use crate::error::{ElenchusError, Result};
    pub use crate::orchestrator::{run, ModelHandle, Orchestrator, RunOutcome};
    pub use crate::providers::factory::TargetSpec;
    pub use crate::providers::{
        GenerateRequest, Message, MessageRole, ModelProvider, ModelReply, ProviderError,
        TokenUsage,
    };
    pub use crate::scenario::{AnswerKey, CanonicalFact, Scenario, ScoringRubric};
    pub use crate::scoring::{ScoreInputs, Scorer};
    pub use crate::storage::{RunMetadata, RunStore};
    pub use crate::trial::{
        Claim, ScoreResult, Severity, TrialFlags, TrialResult, Verdict, VerdictLabel,
        VerificationReport,
    };
}
