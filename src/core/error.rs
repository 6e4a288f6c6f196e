//! Error types for pipeline planning and job orchestration

use thiserror::Error;
use uuid::Uuid;

/// Malformed pipeline definition, detected before any step runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("step with empty id at position {0}")]
    EmptyStepId(usize),

    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("dependency cycle among steps: {}", .steps.join(", "))]
    Cycle { steps: Vec<String> },
}

/// Rejected job control requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("batch job must contain at least one pipeline")]
    EmptyJob,

    #[error("max_parallel must be at least 1")]
    InvalidParallelism,

    #[error("job not found: {0}")]
    JobNotFound(Uuid),
}
