//! Test: reports over the runs of a finished job

use crate::helpers::*;
use migration_validator::core::catalog::InMemoryCatalog;
use migration_validator::core::{JobStatus, RunStatus};
use migration_validator::report::{Priority, ReportService, ReportTarget, UNCATEGORIZED};
use migration_validator::{JobRequest, ReportAggregator};

const ORDERS: &str = r#"
name: "orders"
steps:
  - id: "schema_diff"
    type: "expect"
    config:
      status: "FAIL"
      severity: "blocker"
      message: "column total dropped"
      details: { error_count: 1 }
  - id: "row_count"
    type: "expect"
    config:
      status: "FAIL"
      message: "row count mismatch: 998 of 1000"
      details: { rows_compared: 1000, mismatch_count: 2, error_count: 2 }
"#;

const CYCLIC: &str = r#"
name: "cyclic"
steps:
  - id: "a"
    type: "expect"
    depends_on: ["b"]
  - id: "b"
    type: "expect"
    depends_on: ["a"]
"#;

const CUSTOMERS: &str = r#"
name: "customers"
steps:
  - id: "emails"
    type: "expect"
    config: { status: "PASS", details: { rows_compared: 500 } }
  - id: "mystery"
    type: "expect"
    config: { status: "FAIL", severity: "info", message: "something odd" }
"#;

#[tokio::test]
async fn test_job_report() {
    let catalog = InMemoryCatalog::new()
        .with(pipeline_from_yaml(ORDERS))
        .with(pipeline_from_yaml(CUSTOMERS));
    let (orchestrator, sink) = orchestrator(runner(), catalog);

    let job_id = orchestrator
        .submit(JobRequest::new("nightly", ["orders", "customers"]))
        .await
        .unwrap();
    orchestrator.wait(job_id).await.unwrap();

    let service = ReportService::new(sink, ReportAggregator::default());
    let report = service.generate(ReportTarget::Job(job_id)).await.unwrap();

    let summary = &report.summary;
    assert_eq!(summary.run_count, 2);
    assert_eq!(summary.total_steps, 4);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.pass_rate, 25.0);
    assert_eq!(summary.overall_status, RunStatus::Failed);

    let categories: Vec<&str> = report.root_causes.iter().map(|g| g.category.as_str()).collect();
    assert_eq!(categories, vec!["schema", "row_count", UNCATEGORIZED]);
    assert_eq!(report.root_causes[1].total_errors, 2);
    assert_eq!(report.metrics.totals["rows_compared"], 1500.0);

    // The blocker-severity group leads the recommendations
    assert_eq!(report.recommendations[0].priority, Priority::Critical);
    assert_eq!(report.recommendations[0].category, "schema");
    assert_eq!(report.recommendations[1].priority, Priority::High);
    assert_eq!(
        report.recommendations.last().map(|r| r.priority),
        Some(Priority::Low)
    );

    // Same stored runs, same report
    let again = service.generate(ReportTarget::Job(job_id)).await.unwrap();
    assert_eq!(report.to_json().unwrap(), again.to_json().unwrap());
}

#[tokio::test]
async fn test_job_report_counts_operations_that_never_ran() {
    let catalog = InMemoryCatalog::new().with(pipeline_from_yaml(CYCLIC));
    let (orchestrator, sink) = orchestrator(runner(), catalog);

    let job_id = orchestrator
        .submit(JobRequest::new("broken", ["cyclic", "missing"]))
        .await
        .unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::PartialFailure);

    let report = ReportService::new(sink, ReportAggregator::default())
        .generate(ReportTarget::Job(job_id))
        .await
        .unwrap();

    let summary = &report.summary;
    assert_eq!(summary.run_count, 0);
    assert_eq!(summary.operations_failed, 2);
    assert_eq!(summary.operations_cancelled, 0);
    assert_eq!(summary.overall_status, RunStatus::Failed);
}
