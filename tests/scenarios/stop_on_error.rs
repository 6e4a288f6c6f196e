//! Test: stop_on_error skips later levels after a failed level

use crate::helpers::*;
use migration_validator::core::RunStatus;
use migration_validator::execution::SKIPPED_MESSAGE;
use migration_validator::{ExecutionEvent, Resources, Severity, StepStatus};

const FAILING_FIRST_LEVEL: &str = r#"
name: "customers_migration"
stop_on_error: true

steps:
  - id: "schema"
    type: "expect"
    config: { status: "FAIL", message: "column email missing" }
  - id: "row_counts"
    type: "tracked"
  - id: "nulls"
    type: "tracked"
    depends_on: ["schema"]
  - id: "totals"
    type: "tracked"
    depends_on: ["nulls"]
"#;

#[tokio::test]
async fn test_later_levels_are_skipped() {
    let tracker = TrackingCapability::new();
    let mut runner = runner_with(tracker.clone());
    let events = record_events(&mut runner);

    let run = runner
        .run(&pipeline_from_yaml(FAILING_FIRST_LEVEL), &Resources::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_step_status(&run, "schema", StepStatus::Fail);

    // The failing level itself still runs to completion
    assert_step_status(&run, "row_counts", StepStatus::Pass);

    assert_step_status(&run, "nulls", StepStatus::Skipped);
    assert_step_status(&run, "totals", StepStatus::Skipped);
    assert_eq!(run.step("nulls").unwrap().message, SKIPPED_MESSAGE);
    assert_eq!(tracker.calls(), 1);

    let events = events.lock().unwrap();
    let skipped: Vec<&Vec<String>> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepsSkipped { step_ids, .. } => Some(step_ids),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec![&vec!["nulls".to_string(), "totals".to_string()]]);
    assert_eq!(started_levels(&events).len(), 1);
}

#[tokio::test]
async fn test_without_stop_on_error_everything_runs() {
    let mut spec = pipeline_from_yaml(FAILING_FIRST_LEVEL);
    spec.stop_on_error = false;
    let tracker = TrackingCapability::new();

    let run = runner_with(tracker.clone())
        .run(&spec, &Resources::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.count(StepStatus::Skipped), 0);
    assert_eq!(tracker.calls(), 3);
}

#[tokio::test]
async fn test_error_also_stops_the_pipeline() {
    let yaml = r#"
name: "errors_stop"
stop_on_error: true
steps:
  - { id: "probe", type: "broken" }
  - { id: "after", type: "tracked", depends_on: ["probe"] }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    assert_step_status(&run, "probe", StepStatus::Error);
    assert_step_status(&run, "after", StepStatus::Skipped);
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_warning_failure_does_not_fail_the_run() {
    let yaml = r#"
name: "soft_checks"
steps:
  - id: "row_drift"
    type: "expect"
    config: { status: "FAIL", severity: "warning", message: "2 rows drifted" }
  - { id: "after", type: "tracked", depends_on: ["row_drift"] }
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    let drift = run.step("row_drift").unwrap();
    assert_eq!(drift.status, StepStatus::Fail);
    assert_eq!(drift.severity, Severity::Warning);
    assert_step_status(&run, "after", StepStatus::Pass);
    assert_eq!(run.status, RunStatus::Passed);
}
