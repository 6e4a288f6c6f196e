//! migration-validator - dependency-aware execution engine for data migration validation

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod registry;
pub mod report;

// Re-export commonly used types
pub use core::{
    PipelineRunResult, PipelineSpec, Resources, Severity, StepResult, StepSpec, StepStatus,
};
pub use execution::{
    build_levels, ExecutionEvent, JobOrchestrator, JobRequest, PipelineRunner, RunnerConfig,
    StepExecutor,
};
pub use registry::{CallArgs, Capability, CapabilityError, CapabilityOutcome, StepRegistry};
pub use report::{Report, ReportAggregator, ReportConfig};
