//! Persistence layer for sealed run results and batch jobs

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteResultStore;

use crate::core::{
    job::BatchJob,
    pipeline::PipelineRunResult,
    state::RunStatus,
    step::StepStatus,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary row of a stored run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub total_steps: usize,

    pub passed_steps: usize,

    /// FAIL and ERROR results
    pub failed_steps: usize,
}

impl From<&PipelineRunResult> for RunSummary {
    fn from(run: &PipelineRunResult) -> Self {
        Self {
            run_id: run.run_id,
            pipeline_name: run.pipeline_name.clone(),
            status: run.status,
            started_at: run.started_at,
            completed_at: run.completed_at,
            total_steps: run.steps.len(),
            passed_steps: run.count(StepStatus::Pass),
            failed_steps: run.count(StepStatus::Fail) + run.count(StepStatus::Error),
        }
    }
}

/// Receives sealed results once a run or job reaches a terminal state
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    /// Store a sealed pipeline run
    async fn save_run(&self, run: &PipelineRunResult) -> Result<()>;

    /// Store a terminal batch job
    async fn save_job(&self, job: &BatchJob) -> Result<()>;

    async fn load_run(&self, run_id: Uuid) -> Result<Option<PipelineRunResult>>;

    async fn load_job(&self, job_id: Uuid) -> Result<Option<BatchJob>>;

    /// Most recent runs first, optionally for a single pipeline
    async fn list_runs(&self, pipeline: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;
}

/// In-memory sink (for testing or ephemeral use)
#[derive(Debug, Default)]
pub struct InMemorySink {
    runs: RwLock<HashMap<Uuid, PipelineRunResult>>,
    jobs: RwLock<HashMap<Uuid, BatchJob>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait::async_trait]
impl ResultSink for InMemorySink {
    async fn save_run(&self, run: &PipelineRunResult) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn save_job(&self, job: &BatchJob) -> Result<()> {
        self.jobs.write().await.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<PipelineRunResult>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<BatchJob>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn list_runs(&self, pipeline: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<RunSummary> = runs
            .values()
            .filter(|run| pipeline.map_or(true, |name| run.pipeline_name == name))
            .map(RunSummary::from)
            .collect();

        summaries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        summaries.truncate(limit);
        Ok(summaries)
    }
}
