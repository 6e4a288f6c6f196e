//! Pipeline domain model

use crate::core::{
    state::RunStatus,
    step::{StepResult, StepSpec, StepStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A pipeline definition: an ordered list of steps and their dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline name
    pub name: String,

    /// Mark later levels SKIPPED once a level contains a FAIL or ERROR
    #[serde(default)]
    pub stop_on_error: bool,

    /// Worker cap within a level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Default timeout for steps (in seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_secs: Option<u64>,

    /// Variables injected into every step's arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, serde_json::Value>,

    /// Pipeline steps, in declaration order
    pub steps: Vec<StepSpec>,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            stop_on_error: false,
            max_concurrency: None,
            default_timeout_secs: None,
            variables: BTreeMap::new(),
            steps,
        }
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Sealed outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Step results in declaration order, including skipped steps
    pub steps: Vec<StepResult>,

    pub status: RunStatus,
}

impl PipelineRunResult {
    /// Derive the run status from its step results
    pub fn derive_status(steps: &[StepResult]) -> RunStatus {
        if steps.iter().any(StepResult::is_blocking_failure) {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        }
    }

    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    /// Get the result of a specific step
    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn duration_ms(&self) -> u64 {
        self.completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
