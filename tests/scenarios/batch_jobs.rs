//! Test: batch jobs in sequential and parallel mode

use crate::helpers::*;
use migration_validator::core::catalog::InMemoryCatalog;
use migration_validator::core::{ExecutionMode, JobStatus, OperationStatus};
use migration_validator::execution::JobOrchestrator;
use migration_validator::persistence::ResultSink;
use migration_validator::{JobRequest, PipelineSpec, StepSpec};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

fn tracked_pipeline(name: &str, delay_ms: u64, fail: bool) -> PipelineSpec {
    PipelineSpec::new(
        name,
        vec![StepSpec::new(format!("{}_check", name), "tracked")
            .with_param("delay_ms", json!(delay_ms))
            .with_param("fail", json!(fail))],
    )
}

fn catalog(names: &[&str], delay_ms: u64) -> InMemoryCatalog {
    names.iter().fold(InMemoryCatalog::new(), |catalog, name| {
        catalog.with(tracked_pipeline(name, delay_ms, false))
    })
}

#[tokio::test]
async fn test_sequential_job_runs_in_order() {
    let tracker = TrackingCapability::new();
    let names = ["orders", "customers", "invoices"];
    let (orchestrator, sink) = orchestrator(runner_with(tracker.clone()), catalog(&names, 20));

    let job_id = orchestrator
        .submit(JobRequest::new("nightly", names))
        .await
        .unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.execution_mode, ExecutionMode::Sequential);
    assert_eq!(job.count(OperationStatus::Completed), 3);
    assert_eq!(job.progress.percent, 100.0);
    assert!(job.completed_at.is_some());

    assert_eq!(tracker.max_active(), 1);
    assert_eq!(
        tracker.started(),
        vec!["orders_check", "customers_check", "invoices_check"]
    );

    // Every run and the final job reach the sink
    assert_eq!(sink.run_count().await, 3);
    let stored = sink.load_job(job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_parallel_job_respects_max_parallel() {
    let tracker = TrackingCapability::new();
    let names = ["a", "b", "c", "d", "e"];
    let (orchestrator, _sink) = orchestrator(runner_with(tracker.clone()), catalog(&names, 100));

    let job_id = orchestrator
        .submit(JobRequest::new("wide", names).parallel(2))
        .await
        .unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(tracker.calls(), 5);
    assert_eq!(tracker.max_active(), 2);
}

/// Polls a job until it has finished, recording every progress reading
async fn sample_progress(orchestrator: &JobOrchestrator, job_id: Uuid) -> Vec<f64> {
    let mut seen = Vec::new();
    loop {
        let job = orchestrator.get_job(job_id).await.unwrap();
        seen.push(job.progress.percent);
        if job.status.is_terminal() && job.completed_at.is_some() {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let names = ["p1", "p2", "p3", "p4"];
    let (orchestrator, _sink) = orchestrator(runner(), catalog(&names, 60));

    let job_id = orchestrator
        .submit(JobRequest::new("progress", names))
        .await
        .unwrap();

    let seen = sample_progress(&orchestrator, job_id).await;
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
    assert_eq!(seen.last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_parallel_progress_is_monotonic() {
    // Uneven durations so operations finish out of submission order
    let catalog = InMemoryCatalog::new()
        .with(tracked_pipeline("p1", 150, false))
        .with(tracked_pipeline("p2", 30, false))
        .with(tracked_pipeline("p3", 90, false))
        .with(tracked_pipeline("p4", 20, false));
    let (orchestrator, _sink) = orchestrator(runner(), catalog);

    let job_id = orchestrator
        .submit(JobRequest::new("progress", ["p1", "p2", "p3", "p4"]).parallel(2))
        .await
        .unwrap();

    let seen = sample_progress(&orchestrator, job_id).await;
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
    assert_eq!(seen.last().copied(), Some(100.0));

    let job = orchestrator.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.completed, 4);
}

#[tokio::test]
async fn test_failed_pipeline_gives_partial_failure() {
    let catalog = catalog(&["good"], 10)
        .with(tracked_pipeline("bad", 10, true));
    let (orchestrator, _sink) = orchestrator(runner(), catalog);

    let job_id = orchestrator
        .submit(JobRequest::new("mixed", ["good", "bad", "missing"]).parallel(3))
        .await
        .unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::PartialFailure);
    assert_eq!(job.operations[0].status, OperationStatus::Completed);

    // A failed run still carries its result
    let bad = &job.operations[1];
    assert_eq!(bad.status, OperationStatus::Failed);
    assert!(bad.result.is_some());

    // An unresolvable reference fails only its own operation
    let missing = &job.operations[2];
    assert_eq!(missing.status, OperationStatus::Failed);
    assert!(missing.result.is_none());
    assert!(missing
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("failed to resolve pipeline 'missing'"));
}

#[tokio::test]
async fn test_stop_on_error_cancels_the_rest() {
    let tracker = TrackingCapability::new();
    let catalog = catalog(&["first", "third"], 10).with(tracked_pipeline("second", 10, true));
    let (orchestrator, _sink) = orchestrator(runner_with(tracker.clone()), catalog);

    let job_id = orchestrator
        .submit(JobRequest::new("strict", ["first", "second", "third"]).with_stop_on_error(true))
        .await
        .unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::PartialFailure);
    let statuses: Vec<OperationStatus> = job.operations.iter().map(|op| op.status).collect();
    assert_eq!(
        statuses,
        vec![
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Cancelled
        ]
    );
    assert_eq!(tracker.calls(), 2);
    assert_eq!(job.progress.percent, 100.0);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let (orchestrator, _sink) = orchestrator(runner(), InMemoryCatalog::new());

    let empty: [&str; 0] = [];
    assert!(orchestrator.submit(JobRequest::new("empty", empty)).await.is_err());
    assert!(orchestrator
        .submit(JobRequest::new("zero", ["a"]).parallel(0))
        .await
        .is_err());
    assert!(orchestrator.job_ids().await.is_empty());
}
