//! Test: levels run in dependency order, steps within a level run together

use crate::helpers::*;
use migration_validator::core::RunStatus;
use migration_validator::{ExecutionEvent, Resources, StepStatus};

const DIAMOND: &str = r#"
name: "orders_migration"

steps:
  - id: "totals"
    type: "tracked"
    depends_on: ["row_counts", "schema"]
  - id: "schema"
    type: "tracked"
  - id: "row_counts"
    type: "tracked"
    depends_on: ["schema"]
  - id: "nulls"
    type: "tracked"
    depends_on: ["schema"]
"#;

#[tokio::test]
async fn test_diamond_runs_level_by_level() {
    let tracker = TrackingCapability::new();
    let mut runner = runner_with(tracker.clone());
    let events = record_events(&mut runner);

    let run = runner
        .run(&pipeline_from_yaml(DIAMOND), &Resources::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Passed);

    // Results keep declaration order, not completion order
    assert_eq!(step_ids(&run), vec!["totals", "schema", "row_counts", "nulls"]);

    let events = events.lock().unwrap();
    assert_eq!(
        started_levels(&events),
        vec![
            vec!["schema".to_string()],
            vec!["row_counts".to_string(), "nulls".to_string()],
            vec!["totals".to_string()],
        ]
    );

    // A dependent never starts before everything it depends on has finished
    let schema = run.step("schema").unwrap();
    let row_counts = run.step("row_counts").unwrap();
    let totals = run.step("totals").unwrap();
    assert!(row_counts.started_at >= schema.completed_at);
    assert!(totals.started_at >= row_counts.completed_at);

    assert_eq!(tracker.started().first().map(String::as_str), Some("schema"));
    assert_eq!(tracker.started().last().map(String::as_str), Some("totals"));
}

#[tokio::test]
async fn test_event_stream_brackets_the_run() {
    let mut runner = runner();
    let events = record_events(&mut runner);

    let run = runner
        .run(&pipeline_from_yaml(DIAMOND), &Resources::new())
        .await
        .unwrap();

    let events = events.lock().unwrap();
    match events.first() {
        Some(ExecutionEvent::RunStarted {
            run_id,
            total_steps,
            level_count,
            ..
        }) => {
            assert_eq!(*run_id, run.run_id);
            assert_eq!(*total_steps, 4);
            assert_eq!(*level_count, 3);
        }
        other => panic!("expected RunStarted first, got {:?}", other),
    }
    match events.last() {
        Some(ExecutionEvent::RunCompleted { status, .. }) => assert_eq!(*status, RunStatus::Passed),
        other => panic!("expected RunCompleted last, got {:?}", other),
    }

    let finished = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::StepFinished { .. }))
        .count();
    assert_eq!(finished, 4);
}

#[tokio::test]
async fn test_independent_steps_share_a_level() {
    let yaml = r#"
name: "wide"
steps:
  - { id: "a", type: "tracked", config: { delay_ms: 150 } }
  - { id: "b", type: "tracked", config: { delay_ms: 150 } }
  - { id: "c", type: "tracked", config: { delay_ms: 150 } }
"#;
    let tracker = TrackingCapability::new();
    let runner = runner_with(tracker.clone());

    let run = runner.run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    assert_eq!(run.count(StepStatus::Pass), 3);
    assert_eq!(tracker.max_active(), 3);
}

#[tokio::test]
async fn test_max_concurrency_caps_a_level() {
    let yaml = r#"
name: "capped"
max_concurrency: 2
steps:
  - { id: "a", type: "tracked", config: { delay_ms: 80 } }
  - { id: "b", type: "tracked", config: { delay_ms: 80 } }
  - { id: "c", type: "tracked", config: { delay_ms: 80 } }
  - { id: "d", type: "tracked", config: { delay_ms: 80 } }
  - { id: "e", type: "tracked", config: { delay_ms: 80 } }
"#;
    let tracker = TrackingCapability::new();
    let runner = runner_with(tracker.clone());

    let run = runner.run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();

    assert_eq!(run.count(StepStatus::Pass), 5);
    assert_eq!(tracker.calls(), 5);
    assert_eq!(tracker.max_active(), 2);
}

#[tokio::test]
async fn test_malformed_graph_runs_nothing() {
    let yaml = r#"
name: "cyclic"
steps:
  - { id: "a", type: "tracked", depends_on: ["b"] }
  - { id: "b", type: "tracked", depends_on: ["a"] }
  - { id: "c", type: "tracked" }
"#;
    let tracker = TrackingCapability::new();
    let mut runner = runner_with(tracker.clone());
    let events = record_events(&mut runner);

    let err = runner
        .run(&pipeline_from_yaml(yaml), &Resources::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cycle"));
    assert_eq!(tracker.calls(), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_pipeline_passes() {
    let yaml = r#"
name: "empty"
steps: []
"#;
    let run = runner().run(&pipeline_from_yaml(yaml), &Resources::new()).await.unwrap();
    assert!(run.steps.is_empty());
    assert_eq!(run.status, RunStatus::Passed);
}
