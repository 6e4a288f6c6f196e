//! Builtin capabilities that need no database access

use crate::core::step::{Severity, StepStatus};
use crate::registry::{
    CallArgs, Capability, CapabilityError, CapabilityOutcome, ParamKind, ParamSpec,
    ParameterContract,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Returns exactly the outcome described by its config
///
/// Used to dry-run pipeline authoring and in tests:
///
/// ```yaml
/// - id: "placeholder"
///   type: "expect"
///   config: { status: "FAIL", severity: "warning", message: "not wired yet" }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectCapability;

#[async_trait]
impl Capability for ExpectCapability {
    fn contract(&self) -> ParameterContract {
        ParameterContract::with_params(vec![
            ParamSpec::required("status", ParamKind::String),
            ParamSpec::optional("severity", ParamKind::String),
            ParamSpec::optional("message", ParamKind::String),
            ParamSpec::optional("details", ParamKind::Any),
            ParamSpec::optional("delay_ms", ParamKind::Number),
        ])
    }

    async fn execute(&self, args: CallArgs) -> Result<CapabilityOutcome, CapabilityError> {
        if let Some(delay) = args.param("delay_ms").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let status = parse_status(args.str_param("status").unwrap_or_default())?;
        let severity = match args.str_param("severity") {
            Some(raw) => Some(parse_severity(raw)?),
            None => None,
        };

        Ok(CapabilityOutcome {
            status,
            severity,
            message: args.str_param("message").unwrap_or_default().to_string(),
            details: args.param("details").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Compares `expected` against `actual`, numerically within `tolerance` when both are numbers
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareCapability;

#[async_trait]
impl Capability for CompareCapability {
    fn contract(&self) -> ParameterContract {
        ParameterContract::strict(vec![
            ParamSpec::required("expected", ParamKind::Any),
            ParamSpec::required("actual", ParamKind::Any),
            ParamSpec::optional("tolerance", ParamKind::Number),
        ])
    }

    async fn execute(&self, args: CallArgs) -> Result<CapabilityOutcome, CapabilityError> {
        let expected = args.param("expected").cloned().unwrap_or(Value::Null);
        let actual = args.param("actual").cloned().unwrap_or(Value::Null);
        let tolerance = args.f64_param("tolerance").unwrap_or(0.0);

        let (matched, difference) = match (expected.as_f64(), actual.as_f64()) {
            (Some(e), Some(a)) => {
                let diff = (a - e).abs();
                (diff <= tolerance, Some(diff))
            }
            _ => (expected == actual, None),
        };

        let mut details = json!({ "expected": expected, "actual": actual });
        if let Some(diff) = difference {
            details["difference"] = json!(diff);
        }

        if matched {
            return Ok(CapabilityOutcome::pass("values match").with_details(details));
        }

        details["error_count"] = json!(1);
        Ok(
            CapabilityOutcome::fail(format!("expected {} but found {}", expected, actual))
                .with_details(details),
        )
    }
}

fn parse_status(raw: &str) -> Result<StepStatus, CapabilityError> {
    match raw.to_ascii_uppercase().as_str() {
        "PASS" => Ok(StepStatus::Pass),
        "FAIL" => Ok(StepStatus::Fail),
        "ERROR" => Ok(StepStatus::Error),
        "SKIPPED" => Ok(StepStatus::Skipped),
        other => Err(CapabilityError::Failed(format!("unknown status '{}'", other))),
    }
}

fn parse_severity(raw: &str) -> Result<Severity, CapabilityError> {
    match raw.to_ascii_lowercase().as_str() {
        "info" => Ok(Severity::Info),
        "warning" => Ok(Severity::Warning),
        "error" => Ok(Severity::Error),
        "blocker" => Ok(Severity::Blocker),
        other => Err(CapabilityError::Failed(format!("unknown severity '{}'", other))),
    }
}
