//! Execution state models

use serde::{Deserialize, Serialize};

/// Status of a sealed pipeline run
///
/// A run in progress has no result yet; it is observed through the
/// `RunStarted` and `RunCompleted` execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// No blocking failure
    Passed,
    /// At least one blocking FAIL/ERROR
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASSED" => Some(RunStatus::Passed),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Status of one pipeline execution inside a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Check if operation is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// Aggregate status of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    PartialFailure,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::PartialFailure | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::PartialFailure => "PARTIAL_FAILURE",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "PARTIAL_FAILURE" => Some(JobStatus::PartialFailure),
            "CANCELLED" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// How a batch job dispatches its operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// One operation at a time, in declared order
    #[default]
    Sequential,
    /// Up to `max_parallel` operations at a time
    Parallel,
}

/// Job-level progress snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Operations in a terminal state
    pub completed: usize,

    pub total: usize,

    /// 0.0 to 100.0, rounded to 2 decimals
    pub percent: f64,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            round2(completed as f64 / total as f64 * 100.0)
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
