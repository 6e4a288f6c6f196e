//! Report aggregation over sealed run results
//!
//! The aggregator only reads results. It computes an executive summary,
//! sums of well-known numeric `details` keys, root-cause groups and
//! prioritised recommendations. Output contains no wall-clock data, so the
//! same runs always produce the same report.

pub mod categories;
pub mod recommendations;

pub use categories::{CategoryRule, ReportConfig, RootCauseGroup, StepRef, UNCATEGORIZED};
pub use recommendations::{Priority, Recommendation};

use crate::core::{
    job::BatchJob,
    pipeline::PipelineRunResult,
    state::{round2, OperationStatus, RunStatus},
    step::StepStatus,
};
use crate::persistence::ResultSink;
use anyhow::{Context, Result};
use categories::Categorizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Headline numbers over all aggregated runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub run_count: usize,
    pub runs_passed: usize,
    pub runs_failed: usize,

    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,

    /// passed / total_steps as a percentage, 0 when there are no steps
    pub pass_rate: f64,

    pub total_duration_ms: u64,

    /// Job operations that failed without producing a run
    #[serde(default)]
    pub operations_failed: usize,

    /// Job operations cancelled before producing a run
    #[serde(default)]
    pub operations_cancelled: usize,

    /// FAILED if any run failed or any job operation never produced a run
    pub overall_status: RunStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Sums of configured `details` keys, only for keys that appeared
    pub totals: BTreeMap<String, f64>,

    pub steps_by_type: BTreeMap<String, usize>,
}

/// Consolidated report over one or more runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: ExecutiveSummary,

    pub metrics: AggregateMetrics,

    pub root_causes: Vec<RootCauseGroup>,

    pub recommendations: Vec<Recommendation>,

    /// Output of registered enrichers, keyed by enricher name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl Report {
    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to encode report")
    }
}

/// Optional analytics layered on top of a report (impact scoring and the like)
pub trait ReportEnricher: Send + Sync {
    fn name(&self) -> &str;

    fn enrich(&self, report: &Report) -> Value;
}

/// Aggregates run results into a `Report`
pub struct ReportAggregator {
    config: ReportConfig,
    categorizer: Categorizer,
    enrichers: Vec<Arc<dyn ReportEnricher>>,
}

impl ReportAggregator {
    pub fn new(config: ReportConfig) -> Self {
        let categorizer = Categorizer::new(&config);
        Self {
            config,
            categorizer,
            enrichers: Vec::new(),
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ReportEnricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Aggregate runs; zero runs or zero steps give an empty report
    pub fn aggregate(&self, runs: &[PipelineRunResult]) -> Report {
        self.enrich(self.build(runs))
    }

    fn build(&self, runs: &[PipelineRunResult]) -> Report {
        let summary = Self::summarize(runs);
        let metrics = self.metrics(runs);
        let root_causes = self.categorizer.group(runs);
        let recommendations =
            recommendations::recommend(&root_causes, self.config.escalation_threshold);

        debug!(
            "Aggregated {} runs into {} root-cause groups",
            runs.len(),
            root_causes.len()
        );

        Report {
            summary,
            metrics,
            root_causes,
            recommendations,
            extensions: BTreeMap::new(),
        }
    }

    fn enrich(&self, mut report: Report) -> Report {
        for enricher in &self.enrichers {
            let value = enricher.enrich(&report);
            report.extensions.insert(enricher.name().to_string(), value);
        }

        report
    }

    /// Aggregate a job's runs, counting operations that never produced one
    pub fn aggregate_job(&self, job: &BatchJob) -> Report {
        let runs: Vec<PipelineRunResult> = job.run_results().cloned().collect();
        let mut report = self.build(&runs);

        let unrun = |status: OperationStatus| {
            job.operations
                .iter()
                .filter(|op| op.result.is_none() && op.status == status)
                .count()
        };
        let summary = &mut report.summary;
        summary.operations_failed = unrun(OperationStatus::Failed);
        summary.operations_cancelled = unrun(OperationStatus::Cancelled);
        if summary.operations_failed + summary.operations_cancelled > 0 {
            summary.overall_status = RunStatus::Failed;
        }

        self.enrich(report)
    }

    fn summarize(runs: &[PipelineRunResult]) -> ExecutiveSummary {
        let count = |status: StepStatus| runs.iter().map(|r| r.count(status)).sum::<usize>();
        let total_steps: usize = runs.iter().map(|r| r.steps.len()).sum();
        let passed = count(StepStatus::Pass);
        let runs_failed = runs.iter().filter(|r| !r.passed()).count();

        ExecutiveSummary {
            run_count: runs.len(),
            runs_passed: runs.len() - runs_failed,
            runs_failed,
            total_steps,
            passed,
            failed: count(StepStatus::Fail),
            errors: count(StepStatus::Error),
            skipped: count(StepStatus::Skipped),
            pass_rate: if total_steps == 0 {
                0.0
            } else {
                round2(passed as f64 / total_steps as f64 * 100.0)
            },
            total_duration_ms: runs.iter().map(PipelineRunResult::duration_ms).sum(),
            operations_failed: 0,
            operations_cancelled: 0,
            overall_status: if runs_failed > 0 {
                RunStatus::Failed
            } else {
                RunStatus::Passed
            },
        }
    }

    fn metrics(&self, runs: &[PipelineRunResult]) -> AggregateMetrics {
        let mut metrics = AggregateMetrics::default();

        for result in runs.iter().flat_map(|r| r.steps.iter()) {
            *metrics
                .steps_by_type
                .entry(result.step_type.clone())
                .or_insert(0) += 1;

            for key in &self.config.metric_keys {
                if let Some(value) = result.details.get(key).and_then(Value::as_f64) {
                    *metrics.totals.entry(key.clone()).or_insert(0.0) += value;
                }
            }
        }

        metrics
    }
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new(ReportConfig::default())
    }
}

/// What to build a report for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    Run(Uuid),
    Job(Uuid),
}

/// Builds reports from sealed results held by a sink
pub struct ReportService {
    sink: Arc<dyn ResultSink>,
    aggregator: ReportAggregator,
}

impl ReportService {
    pub fn new(sink: Arc<dyn ResultSink>, aggregator: ReportAggregator) -> Self {
        Self { sink, aggregator }
    }

    pub async fn generate(&self, target: ReportTarget) -> Result<Report> {
        match target {
            ReportTarget::Run(run_id) => {
                let run = self
                    .sink
                    .load_run(run_id)
                    .await?
                    .with_context(|| format!("Run not found: {}", run_id))?;
                Ok(self.aggregator.aggregate(&[run]))
            }
            ReportTarget::Job(job_id) => {
                let job = self
                    .sink
                    .load_job(job_id)
                    .await?
                    .with_context(|| format!("Job not found: {}", job_id))?;
                Ok(self.aggregator.aggregate_job(&job))
            }
        }
    }
}
