//! Pipeline execution engine

pub mod batch;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use batch::{JobOrchestrator, JobRequest, DEFAULT_RETAINED_JOBS};
pub use executor::StepExecutor;
pub use runner::{EventHandler, ExecutionEvent, PipelineRunner, RunnerConfig, SKIPPED_MESSAGE};
pub use scheduler::{build_levels, ExecutionLevel, ExecutionPlan};
