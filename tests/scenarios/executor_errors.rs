//! Test: every step ends in a terminal result, whatever its capability does

use crate::helpers::*;
use migration_validator::core::{ErrorKind, RunStatus};
use migration_validator::{Resources, StepStatus};
use serde_json::json;

#[tokio::test]
async fn test_unknown_type_is_an_error_result() {
    let yaml = r#"
name: "typo"
steps:
  - { id: "rows", type: "row_cuont" }
  - { id: "schema", type: "tracked" }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    let rows = run.step("rows").unwrap();
    assert_eq!(rows.status, StepStatus::Error);
    assert_eq!(rows.error_kind, Some(ErrorKind::UnknownStepType));
    assert!(rows.message.contains("row_cuont"));

    // Siblings are unaffected
    assert_step_status(&run, "schema", StepStatus::Pass);
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let yaml = r#"
name: "panicky"
steps:
  - { id: "boom", type: "panic" }
  - { id: "fine", type: "tracked" }
  - { id: "after", type: "tracked", depends_on: ["boom"] }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    let boom = run.step("boom").unwrap();
    assert_eq!(boom.status, StepStatus::Error);
    assert_eq!(boom.error_kind, Some(ErrorKind::Panicked));
    assert!(boom.message.contains("blew up"));

    assert_step_status(&run, "fine", StepStatus::Pass);
    // No stop_on_error, so the dependent still runs
    assert_step_status(&run, "after", StepStatus::Pass);
}

#[tokio::test]
async fn test_step_timeout() {
    let yaml = r#"
name: "slow"
steps:
  - id: "stuck"
    type: "tracked"
    timeout_secs: 1
    config: { delay_ms: 5000 }
"#;
    let started = std::time::Instant::now();
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    let stuck = run.step("stuck").unwrap();
    assert_eq!(stuck.status, StepStatus::Error);
    assert_eq!(stuck.error_kind, Some(ErrorKind::Timeout));
    assert!(stuck.message.contains("timed out"));
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
}

#[tokio::test]
async fn test_pipeline_default_timeout_applies() {
    let yaml = r#"
name: "slow_default"
default_timeout_secs: 1
steps:
  - { id: "stuck", type: "tracked", config: { delay_ms: 5000 } }
  - { id: "quick", type: "tracked", config: { delay_ms: 10 } }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    assert_eq!(run.step("stuck").unwrap().error_kind, Some(ErrorKind::Timeout));
    assert_step_status(&run, "quick", StepStatus::Pass);
}

#[tokio::test]
async fn test_capability_error_keeps_its_message() {
    let yaml = r#"
name: "broken"
steps:
  - { id: "probe", type: "broken" }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    let probe = run.step("probe").unwrap();
    assert_eq!(probe.status, StepStatus::Error);
    assert_eq!(probe.error_kind, Some(ErrorKind::CapabilityFailed));
    assert!(probe.message.contains("connection refused"));
}

#[tokio::test]
async fn test_parameter_mismatch() {
    // compare declares a strict contract: expected and actual are required
    let yaml = r#"
name: "mismatch"
steps:
  - { id: "missing", type: "compare", config: { expected: 10 } }
  - { id: "extra", type: "compare", config: { expected: 10, actual: 10, colour: "red" } }
  - { id: "ok", type: "compare", config: { expected: 10, actual: 10.4, tolerance: 0.5 } }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    for id in ["missing", "extra"] {
        let step = run.step(id).unwrap();
        assert_eq!(step.status, StepStatus::Error, "{}: {}", id, step.message);
        assert_eq!(step.error_kind, Some(ErrorKind::ParameterMismatch));
    }
    assert_step_status(&run, "ok", StepStatus::Pass);
}

#[tokio::test]
async fn test_pipeline_variables_reach_capabilities() {
    let yaml = r#"
name: "vars"
variables:
  expected: 42
steps:
  - { id: "uses_var", type: "compare", config: { actual: 42 } }
"#;
    let run = runner()
        .run(
            &pipeline_from_yaml(yaml),
            &Resources::new().with_variable("tolerance", json!(0)),
        )
        .await
        .unwrap();

    assert_step_status(&run, "uses_var", StepStatus::Pass);
}
