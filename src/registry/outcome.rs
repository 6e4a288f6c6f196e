//! Capability outcome and error types

use crate::core::step::{Severity, StepStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types for capability calls
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid validator output: {0}")]
    InvalidOutput(String),

    #[error("failed to start validator: {0}")]
    Spawn(String),

    #[error("validator timed out after {}", format_limit(.0))]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Whole seconds, or milliseconds below one second
pub(crate) fn format_limit(limit: &Duration) -> String {
    if limit.as_secs() == 0 && !limit.is_zero() {
        format!("{}ms", limit.as_millis())
    } else {
        format!("{}s", limit.as_secs())
    }
}

/// What a capability reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutcome {
    pub status: StepStatus,

    /// Defaults by status when absent
    #[serde(default)]
    pub severity: Option<Severity>,

    #[serde(default)]
    pub message: String,

    /// Validator-specific payload
    #[serde(default)]
    pub details: serde_json::Value,
}

impl CapabilityOutcome {
    pub fn new(status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            severity: None,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Pass, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Fail, message)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
