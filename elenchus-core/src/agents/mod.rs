//! Role-specialized evaluation agents
//!
//! Five roles drive a trial: the questioner scripts the shopper's side of
//! the conversation, the extractor decomposes the target's answers into
//! atomic claims, N independent verifiers judge each claim against the
//! answer key, the adjudicator collapses their verdicts, and the scorer
//! (see [`crate::scoring`]) maps the outcome onto the SHIP rubric.
//!
//! Each LLM-backed agent owns a fixed system prompt and a strict JSON
//! output schema. Agents see only their declared inputs; no agent ever
//! evaluates its own output.

use thiserror::Error;

mod adjudicator;
mod extractor;
pub mod prompts;
mod questioner;
mod verifier;

pub use adjudicator::Adjudicator;
pub use extractor::Extractor;
pub use questioner::{substitute_placeholders, Questioner, QuestionTurn};
pub use verifier::Verifier;

/// Errors from evaluation agents.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The model's output could not be coerced into JSON
    #[error("{agent} returned no usable JSON: {source}")]
    Protocol {
        agent: &'static str,
        #[source]
        source: crate::coerce::CoerceError,
    },

    /// The JSON did not match the agent's output schema
    #[error("{agent} output failed schema validation: {detail}")]
    Schema { agent: &'static str, detail: String },

    /// The underlying provider call failed
    #[error("provider call failed: {0}")]
    Provider(#[from] crate::providers::ProviderError),
}

impl AgentError {
    /// Protocol and schema errors earn one retry with the same prompt;
    /// provider errors already went through the adapter's retry budget.
    pub fn is_retryable_protocol(&self) -> bool {
        matches!(
            self,
            AgentError::Protocol { .. } | AgentError::Schema { .. }
        )
    }
}
