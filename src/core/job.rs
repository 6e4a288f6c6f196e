//! Batch job and operation models

use crate::core::{
    pipeline::PipelineRunResult,
    state::{ExecutionMode, JobStatus, OperationStatus, Progress},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pipeline execution inside a batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: Uuid,

    /// Reference resolved through the pipeline catalog
    pub pipeline_ref: String,

    pub status: OperationStatus,

    /// Run result once the pipeline has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineRunResult>,

    /// Configuration, resolution or worker error that prevented a run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn new(pipeline_ref: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            pipeline_ref: pipeline_ref.into(),
            status: OperationStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// An orchestrated set of pipeline executions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: Uuid,

    pub name: String,

    pub operations: Vec<Operation>,

    pub execution_mode: ExecutionMode,

    pub max_parallel: usize,

    pub stop_on_error: bool,

    pub status: JobStatus,

    pub progress: Progress,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn new(
        name: impl Into<String>,
        pipeline_refs: &[String],
        execution_mode: ExecutionMode,
        max_parallel: usize,
        stop_on_error: bool,
    ) -> Self {
        let operations: Vec<Operation> = pipeline_refs.iter().map(Operation::new).collect();
        let progress = Progress::new(0, operations.len());
        Self {
            job_id: Uuid::new_v4(),
            name: name.into(),
            operations,
            execution_mode,
            max_parallel,
            stop_on_error,
            status: JobStatus::Pending,
            progress,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Recompute progress from operation states
    pub fn refresh_progress(&mut self) {
        let completed = self
            .operations
            .iter()
            .filter(|op| op.status.is_terminal())
            .count();
        self.progress = Progress::new(completed, self.operations.len());
    }

    pub fn count(&self, status: OperationStatus) -> usize {
        self.operations.iter().filter(|op| op.status == status).count()
    }

    /// Run results of operations that completed or failed with a run
    pub fn run_results(&self) -> impl Iterator<Item = &PipelineRunResult> {
        self.operations.iter().filter_map(|op| op.result.as_ref())
    }
}
