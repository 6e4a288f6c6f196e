//! Step executor - runs individual steps through their registered capability

use crate::{
    core::{
        context::Resources,
        step::{ErrorKind, Severity, StepResult, StepSpec, StepStatus},
    },
    registry::{outcome::format_limit, CallArgs, CapabilityError, CapabilityOutcome, StepRegistry},
};
use chrono::Utc;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Executes a single step
///
/// Never returns an error: unknown types, contract mismatches, capability
/// errors, panics and timeouts all become a `StepResult` with status ERROR.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<StepRegistry>,
    default_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            default_timeout: None,
        }
    }

    /// Timeout used when neither the step nor its pipeline sets one
    pub fn with_default_timeout(mut self, default_timeout: Option<Duration>) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Execute a step and return its normalised result
    pub async fn execute(
        &self,
        step: &StepSpec,
        resources: &Resources,
        pipeline_timeout: Option<Duration>,
    ) -> StepResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let elapsed_ms = || clock.elapsed().as_millis() as u64;

        debug!("Executing step {} (type {})", step.id, step.step_type);

        let Some(capability) = self.registry.get(&step.step_type) else {
            warn!("Step {} has unknown type '{}'", step.id, step.step_type);
            return StepResult::error(
                step,
                ErrorKind::UnknownStepType,
                format!("unknown step type '{}'", step.step_type),
                started_at,
                elapsed_ms(),
            );
        };

        let args = Self::build_args(step, resources);
        if let Err(mismatch) = capability.contract().check(&args, step.config.keys()) {
            warn!("Step {} rejected: {}", step.id, mismatch);
            return StepResult::error(
                step,
                ErrorKind::ParameterMismatch,
                mismatch,
                started_at,
                elapsed_ms(),
            );
        }

        let limit = step
            .timeout_secs
            .map(Duration::from_secs)
            .or(pipeline_timeout)
            .or(self.default_timeout);

        // Run the call on its own task so a panicking capability is contained
        let mut handle = tokio::spawn(async move { capability.execute(args).await });

        let joined = match limit {
            Some(limit) => match timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    warn!("Step {} timed out after {}", step.id, format_limit(&limit));
                    return StepResult::error(
                        step,
                        ErrorKind::Timeout,
                        format!("step timed out after {}", format_limit(&limit)),
                        started_at,
                        elapsed_ms(),
                    );
                }
            },
            None => handle.await,
        };

        let outcome = match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e @ CapabilityError::Timeout(_))) => {
                warn!("Step {}: {}", step.id, e);
                return StepResult::error(
                    step,
                    ErrorKind::Timeout,
                    e.to_string(),
                    started_at,
                    elapsed_ms(),
                );
            }
            Ok(Err(e)) => {
                warn!("Step {} could not run: {}", step.id, e);
                return StepResult::error(
                    step,
                    ErrorKind::CapabilityFailed,
                    e.to_string(),
                    started_at,
                    elapsed_ms(),
                );
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!("Step {} panicked: {}", step.id, message);
                return StepResult::error(
                    step,
                    ErrorKind::Panicked,
                    format!("capability panicked: {}", message),
                    started_at,
                    elapsed_ms(),
                );
            }
            Err(e) => {
                return StepResult::error(
                    step,
                    ErrorKind::CapabilityFailed,
                    format!("capability task failed: {}", e),
                    started_at,
                    elapsed_ms(),
                );
            }
        };

        let result = Self::normalise(step, outcome, started_at, elapsed_ms());
        info!(
            "Step {} finished: {} ({}ms)",
            step.id,
            result.status.as_str(),
            result.duration_ms
        );
        result
    }

    /// Injected variables first, then the step's own config on top
    fn build_args(step: &StepSpec, resources: &Resources) -> CallArgs {
        let mut params = resources.variables.clone();
        params.extend(step.config.iter().map(|(k, v)| (k.clone(), v.clone())));

        CallArgs {
            step_id: step.id.clone(),
            params,
            connections: resources.connections.clone(),
        }
    }

    fn normalise(
        step: &StepSpec,
        outcome: CapabilityOutcome,
        started_at: chrono::DateTime<Utc>,
        duration_ms: u64,
    ) -> StepResult {
        let status = outcome.status;
        let message = if outcome.message.trim().is_empty() {
            default_message(status).to_string()
        } else {
            outcome.message
        };

        StepResult {
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            status,
            severity: outcome
                .severity
                .unwrap_or_else(|| Severity::default_for(status)),
            message,
            details: outcome.details,
            error_kind: (status == StepStatus::Error).then_some(ErrorKind::CapabilityFailed),
            duration_ms,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

fn default_message(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pass => "check passed",
        StepStatus::Fail => "check found a discrepancy",
        StepStatus::Error => "check could not run",
        StepStatus::Skipped => "check skipped",
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
