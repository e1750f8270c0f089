//! Questioner agent: emits the shopper's side of the conversation
//!
//! Default mode is deterministic: the scenario's scripted turns flow out
//! verbatim after placeholder substitution, preserving SHIP
//! mystery-shopper conditions (no optimal prompting, no injected
//! context). LLM paraphrase mode runs only when the scenario explicitly
//! allows it.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::prompts;
use super::AgentError;
use crate::coerce::coerce_json;
use crate::providers::{GenerateRequest, Message, ModelProvider};
use crate::scenario::Scenario;

/// A question turn ready to send to the target
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionTurn {
    pub turn_id: String,
    pub user_message: String,
}

/// Placeholder tokens recognized in scripted turns, in both bracket
/// styles, paired with the scenario field that resolves them.
const PLACEHOLDERS: &[(&str, PlaceholderField)] = &[
    ("[plan name]", PlaceholderField::PlanName),
    ("{plan_name}", PlaceholderField::PlanName),
    ("[doctor name]", PlaceholderField::DoctorName),
    ("{doctor_name}", PlaceholderField::DoctorName),
    ("[service area]", PlaceholderField::ServiceArea),
    ("{service_area}", PlaceholderField::ServiceArea),
];

#[derive(Clone, Copy)]
enum PlaceholderField {
    PlanName,
    DoctorName,
    ServiceArea,
}

impl PlaceholderField {
    fn resolve(self, scenario: &Scenario) -> Option<String> {
        match self {
            PlaceholderField::PlanName => scenario
                .plan_information
                .as_ref()
                .map(|p| p.plan_name.clone()),
            PlaceholderField::DoctorName => scenario.persona.primary_care_physician.clone(),
            PlaceholderField::ServiceArea => scenario
                .plan_information
                .as_ref()
                .and_then(|p| p.service_area.clone()),
        }
    }
}

/// Replace every recognized placeholder with its scenario value.
///
/// Unresolved placeholders (the scenario lacks the field) are left intact
/// and logged as warnings; they are not errors. Applying this twice is
/// the same as applying it once.
pub fn substitute_placeholders(message: &str, scenario: &Scenario) -> String {
    let mut result = message.to_string();

    for (token, field) in PLACEHOLDERS {
        if !result.contains(token) {
            continue;
        }
        match field.resolve(scenario) {
            Some(value) => result = result.replace(token, &value),
            None => tracing::warn!(
                scenario_id = %scenario.scenario_id,
                placeholder = token,
                "placeholder left unresolved: scenario does not provide a value"
            ),
        }
    }

    result
}

/// The questioner agent.
pub struct Questioner {
    agent: Arc<dyn ModelProvider>,
    seed: u64,
}

impl Questioner {
    pub fn new(agent: Arc<dyn ModelProvider>, seed: u64) -> Self {
        Self { agent, seed }
    }

    /// Produce the ordered question turns for a scenario.
    pub async fn generate(&self, scenario: &Scenario) -> Result<Vec<QuestionTurn>, AgentError> {
        let substituted: Vec<QuestionTurn> = scenario
            .scripted_turns
            .iter()
            .map(|turn| QuestionTurn {
                turn_id: turn.turn_id.clone(),
                user_message: substitute_placeholders(&turn.user_message, scenario),
            })
            .collect();

        if !scenario.allows_paraphrasing() {
            return Ok(substituted);
        }
        self.paraphrase(scenario, substituted).await
    }

    /// LLM mode: paraphrase the substituted turns while preserving all
    /// substantive content.
    async fn paraphrase(
        &self,
        scenario: &Scenario,
        turns: Vec<QuestionTurn>,
    ) -> Result<Vec<QuestionTurn>, AgentError> {
        let user_input = json!({
            "scenario_id": scenario.scenario_id,
            "scripted_turns": turns
                .iter()
                .map(|t| json!({"turn_id": t.turn_id, "user_message": t.user_message}))
                .collect::<Vec<_>>(),
            "variation_knobs": scenario.variation_knobs,
        });
        let request = GenerateRequest::new(vec![
            Message::system(prompts::QUESTIONER_SYSTEM),
            Message::user(format!(
                "Generate questions for this scenario:\n\n{}",
                serde_json::to_string_pretty(&user_input).unwrap_or_default()
            )),
        ])
        .with_seed(self.agent.supports_seed().then_some(self.seed));

        let reply = self.agent.generate(&request).await?;
        let value = coerce_json(&reply.content).map_err(|source| AgentError::Protocol {
            agent: "questioner",
            source,
        })?;

        #[derive(Deserialize)]
        struct Turns {
            turns: Vec<QuestionTurn>,
        }
        let parsed: Turns =
            serde_json::from_value(value).map_err(|e| AgentError::Schema {
                agent: "questioner",
                detail: e.to_string(),
            })?;

        if parsed.turns.len() != turns.len() {
            return Err(AgentError::Schema {
                agent: "questioner",
                detail: format!(
                    "expected {} turns, got {}",
                    turns.len(),
                    parsed.turns.len()
                ),
            });
        }
        Ok(parsed.turns)
    }
}
