//! Test: cooperative cancellation of batch jobs

use crate::helpers::*;
use migration_validator::core::catalog::InMemoryCatalog;
use migration_validator::core::{JobStatus, OperationStatus};
use migration_validator::{JobRequest, PipelineSpec, StepSpec};
use serde_json::json;
use std::time::Duration;

fn slow_catalog(names: &[&str]) -> InMemoryCatalog {
    names.iter().fold(InMemoryCatalog::new(), |catalog, name| {
        catalog.with(PipelineSpec::new(
            *name,
            vec![StepSpec::new("check", "tracked").with_param("delay_ms", json!(300))],
        ))
    })
}

#[tokio::test]
async fn test_cancel_running_job() {
    let tracker = TrackingCapability::new();
    let names = ["a", "b", "c", "d"];
    let (orchestrator, _sink) = orchestrator(runner_with(tracker.clone()), slow_catalog(&names));

    let job_id = orchestrator
        .submit(JobRequest::new("long", names))
        .await
        .unwrap();

    // Let the first operation start
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.cancel(job_id).await.unwrap();

    // Visible immediately, before the running operation has drained
    let snapshot = orchestrator.get_job(job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert!(snapshot
        .operations
        .iter()
        .all(|op| op.status == OperationStatus::Cancelled));

    let job = orchestrator.wait(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.operations.iter().all(|op| op.result.is_none()));
    assert_eq!(job.progress.percent, 100.0);

    // No new operation was dispatched after the cancel
    assert_eq!(tracker.calls(), 1);
}

#[tokio::test]
async fn test_cancel_finished_job_is_a_noop() {
    let (orchestrator, _sink) = orchestrator(runner(), slow_catalog(&["only"]));

    let job_id = orchestrator
        .submit(JobRequest::new("short", ["only"]))
        .await
        .unwrap();
    let finished = orchestrator.wait(job_id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);

    orchestrator.cancel(job_id).await.unwrap();

    let job = orchestrator.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.operations[0].status, OperationStatus::Completed);
}

#[tokio::test]
async fn test_unknown_job() {
    let (orchestrator, _sink) = orchestrator(runner(), InMemoryCatalog::new());
    let missing = uuid::Uuid::new_v4();

    assert!(orchestrator.get_job(missing).await.is_err());
    assert!(orchestrator.get_progress(missing).await.is_err());
    assert!(orchestrator.cancel(missing).await.is_err());
}
