//! Run configuration
//!
//! Everything a run needs is carried explicitly in a [`RunConfig`] built
//! once at startup; no component reads configuration from globals after
//! that point.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ElenchusError, Result};
use crate::providers::factory::TargetSpec;
use crate::providers::DEFAULT_REQUEST_TIMEOUT;

/// Default number of independent verifiers per trial.
pub const DEFAULT_JUDGES: usize = 2;

/// Default seed passed to seed-capable providers.
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Path to the scenario JSON file
    pub scenario_path: PathBuf,

    /// Target model under evaluation ("provider:model")
    pub target: String,

    /// Model powering the extractor/verifier agents. Defaults to the
    /// offline mock agent.
    #[serde(default = "default_agent_model")]
    pub agent_model: String,

    /// Number of independent verifier instances (minimum 1)
    #[serde(default = "default_judges")]
    pub judges: usize,

    /// Seed for seed-capable providers
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Root directory for run artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Overrides the timestamp-derived run id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Per-provider request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_agent_model() -> String {
    "mock:agent".to_string()
}

fn default_judges() -> usize {
    DEFAULT_JUDGES
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl RunConfig {
    /// Minimal config for a scenario/target pair, everything else at
    /// defaults.
    pub fn new(scenario_path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            scenario_path: scenario_path.into(),
            target: target.into(),
            agent_model: default_agent_model(),
            judges: DEFAULT_JUDGES,
            seed: DEFAULT_SEED,
            output_dir: default_output_dir(),
            run_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Parse and sanity-check the target and agent specs.
    pub fn validate(&self) -> Result<(TargetSpec, TargetSpec)> {
        if self.judges == 0 {
            return Err(ElenchusError::Configuration(
                "judges must be at least 1".into(),
            ));
        }
        let target: TargetSpec = self.target.parse()?;
        let agent: TargetSpec = self.agent_model.parse()?;
        Ok((target, agent))
    }
}
