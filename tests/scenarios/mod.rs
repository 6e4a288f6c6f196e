//! Scenario-based tests for the validation engine

mod batch_jobs;
mod cancellation;
mod dag_levels;
mod executor_errors;
mod reporting;
mod stop_on_error;
