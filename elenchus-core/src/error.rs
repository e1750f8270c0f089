//! Error types for elenchus operations

/// Result type for elenchus operations
pub type Result<T> = std::result::Result<T, ElenchusError>;

/// Error types for the evaluation pipeline
#[derive(Debug, thiserror::Error)]
pub enum ElenchusError {
    /// Startup configuration error (missing credentials, unknown provider,
    /// malformed scenario). No run directory is created for these.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Scenario failed validation
    #[error("Invalid scenario '{scenario_id}': {reason}")]
    InvalidScenario { scenario_id: String, reason: String },

    /// Provider call failed (after in-adapter retries, where applicable)
    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    /// Agent protocol error (coercion or schema validation failed)
    #[error("Agent error: {0}")]
    Agent(#[from] crate::agents::AgentError),

    /// Artifact store error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// A data-model invariant was violated. Always a bug; raised loudly
    /// with the offending record.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
