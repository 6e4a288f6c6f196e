//! Step domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A single declared validation check in a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique step identifier (within the pipeline)
    pub id: String,

    /// Capability name this step invokes
    #[serde(rename = "type")]
    pub step_type: String,

    /// Opaque parameters handed to the capability
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,

    /// List of step IDs this step depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Timeout for this step (overrides the pipeline default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            config: BTreeMap::new(),
            depends_on: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Check if all dependencies are among the already placed steps
    pub fn dependencies_met(&self, placed: &HashSet<&str>) -> bool {
        self.depends_on.iter().all(|dep| placed.contains(dep.as_str()))
    }
}

/// Terminal status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// The check ran and found no discrepancy
    Pass,
    /// The check ran and found a discrepancy
    Fail,
    /// The check could not run
    Error,
    /// The step was not run because an upstream level stopped the pipeline
    Skipped,
}

impl StepStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Fail | StepStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pass => "PASS",
            StepStatus::Fail => "FAIL",
            StepStatus::Error => "ERROR",
            StepStatus::Skipped => "SKIPPED",
        }
    }
}

/// Importance of a result, assigned by the capability
///
/// The engine only compares severities; their meaning belongs to the validators.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Blocker,
}

impl Severity {
    /// Failures at this severity make the pipeline fail
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::Error
    }

    /// Default severity for a status when the capability did not provide one
    pub fn default_for(status: StepStatus) -> Self {
        match status {
            StepStatus::Pass | StepStatus::Skipped => Severity::Info,
            StepStatus::Fail | StepStatus::Error => Severity::Error,
        }
    }
}

/// Why a step ended in ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownStepType,
    ParameterMismatch,
    CapabilityFailed,
    Panicked,
    Timeout,
}

/// Normalised result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,

    /// Capability name the step declared
    pub step_type: String,

    pub status: StepStatus,

    pub severity: Severity,

    pub message: String,

    /// Capability payload, passed through verbatim
    #[serde(default)]
    pub details: serde_json::Value,

    /// Set when `status` is ERROR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    pub duration_ms: u64,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    /// Result for a step that could not run
    pub fn error(
        step: &StepSpec,
        kind: ErrorKind,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            status: StepStatus::Error,
            severity: Severity::Error,
            message: message.into(),
            details: serde_json::Value::Null,
            error_kind: Some(kind),
            duration_ms,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Result for a step that was never dispatched
    pub fn skipped(step: &StepSpec, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            status: StepStatus::Skipped,
            severity: Severity::Info,
            message: reason.into(),
            details: serde_json::Value::Null,
            error_kind: None,
            duration_ms: 0,
            started_at: now,
            completed_at: now,
        }
    }

    /// A FAIL/ERROR that the step's own severity does not mark as non-blocking
    pub fn is_blocking_failure(&self) -> bool {
        self.status.is_failure() && self.severity.is_blocking()
    }
}
