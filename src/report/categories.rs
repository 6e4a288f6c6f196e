//! Root-cause categories and grouping of failing results

use crate::core::{
    condition::{MatchPattern, PatternSpec},
    pipeline::PipelineRunResult,
    step::{Severity, StepResult},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the group collecting failures that match no category
pub const UNCATEGORIZED: &str = "uncategorized";

/// At most this many sample messages are kept per group
const MAX_SAMPLES: usize = 3;

/// A failure category and the patterns that select it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,

    /// Matched against the step type and message
    pub patterns: Vec<PatternSpec>,
}

impl CategoryRule {
    pub fn new<I, P>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PatternSpec>,
    {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Aggregation settings, the `report` section of the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Checked in order; a failure joins the first category it matches
    pub categories: Vec<CategoryRule>,

    /// Numeric `details` keys summed into the aggregate metrics
    pub metric_keys: Vec<String>,

    /// `details` key holding the number of errors a step found
    pub error_count_key: String,

    /// Groups with more errors than this are escalated to high priority
    pub escalation_threshold: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                CategoryRule::new("schema", ["schema", "column", "data type", "datatype"]),
                CategoryRule::new("row_count", ["row count", "row_count", "count mismatch"]),
                CategoryRule::new(
                    "foreign_key",
                    ["foreign key", "foreign_key", "referential", "orphan"],
                ),
                CategoryRule::new("nulls", ["null"]),
                CategoryRule::new(
                    "statistics",
                    ["statistic", "distribution", "mean", "stddev", "checksum"],
                ),
            ],
            metric_keys: [
                "source_row_count",
                "target_row_count",
                "rows_compared",
                "mismatch_count",
                "error_count",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            error_count_key: "error_count".to_string(),
            escalation_threshold: 100,
        }
    }
}

/// Reference to one step result inside a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub step_id: String,
}

/// Failing results sharing a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseGroup {
    pub category: String,

    pub affected_steps: usize,

    pub total_errors: u64,

    pub max_severity: Severity,

    pub members: Vec<StepRef>,

    /// Up to three distinct messages, in encounter order
    pub sample_messages: Vec<String>,
}

impl RootCauseGroup {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            affected_steps: 0,
            total_errors: 0,
            max_severity: Severity::Info,
            members: Vec::new(),
            sample_messages: Vec::new(),
        }
    }

    fn add(&mut self, run: &PipelineRunResult, result: &StepResult, errors: u64) {
        self.affected_steps += 1;
        self.total_errors += errors;
        self.max_severity = self.max_severity.max(result.severity);
        self.members.push(StepRef {
            run_id: run.run_id,
            pipeline_name: run.pipeline_name.clone(),
            step_id: result.step_id.clone(),
        });
        if self.sample_messages.len() < MAX_SAMPLES
            && !self.sample_messages.contains(&result.message)
        {
            self.sample_messages.push(result.message.clone());
        }
    }
}

struct CompiledCategory {
    name: String,
    patterns: Vec<MatchPattern>,
}

/// Classifies failing results into root-cause groups
pub(crate) struct Categorizer {
    categories: Vec<CompiledCategory>,
    error_count_key: String,
}

impl Categorizer {
    pub(crate) fn new(config: &ReportConfig) -> Self {
        Self {
            categories: config
                .categories
                .iter()
                .map(|rule| CompiledCategory {
                    name: rule.name.clone(),
                    patterns: rule.patterns.iter().map(MatchPattern::compile).collect(),
                })
                .collect(),
            error_count_key: config.error_count_key.clone(),
        }
    }

    /// Category of a result, `None` if no category matches
    pub(crate) fn classify(&self, result: &StepResult) -> Option<&str> {
        self.categories
            .iter()
            .find(|category| {
                category
                    .patterns
                    .iter()
                    .any(|p| p.matches(&result.step_type) || p.matches(&result.message))
            })
            .map(|category| category.name.as_str())
    }

    fn error_count(&self, result: &StepResult) -> u64 {
        result
            .details
            .get(&self.error_count_key)
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }

    /// Group every FAIL/ERROR result of `runs`
    ///
    /// Groups follow category declaration order, with the uncategorized
    /// group last; categories without failures are omitted.
    pub(crate) fn group(&self, runs: &[PipelineRunResult]) -> Vec<RootCauseGroup> {
        let mut groups: Vec<RootCauseGroup> = self
            .categories
            .iter()
            .map(|c| RootCauseGroup::new(&c.name))
            .collect();
        let mut uncategorized = RootCauseGroup::new(UNCATEGORIZED);

        for run in runs {
            for result in run.steps.iter().filter(|r| r.status.is_failure()) {
                let errors = self.error_count(result);
                let position = self.classify(result).and_then(|name| {
                    groups.iter().position(|g| g.category == name)
                });
                match position {
                    Some(index) => groups[index].add(run, result, errors),
                    None => uncategorized.add(run, result, errors),
                }
            }
        }

        groups.push(uncategorized);
        groups.retain(|g| g.affected_steps > 0);
        groups
    }
}
