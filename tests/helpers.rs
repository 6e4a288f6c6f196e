//! Test utilities shared by the scenario tests
#![allow(dead_code)]

use async_trait::async_trait;
use migration_validator::core::catalog::InMemoryCatalog;
use migration_validator::execution::{JobOrchestrator, PipelineRunner, RunnerConfig, StepExecutor};
use migration_validator::persistence::InMemorySink;
use migration_validator::registry::{CallArgs, Capability, CapabilityError, CapabilityOutcome, StepRegistry};
use migration_validator::{ExecutionEvent, PipelineRunResult, PipelineSpec, StepStatus};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sleeps for `delay_ms` and records how many calls overlapped
///
/// Config: `delay_ms` (default 50), `fail` (default false).
#[derive(Default)]
pub struct TrackingCapability {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl TrackingCapability {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Step ids in the order their calls started
    pub fn started(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl Capability for TrackingCapability {
    async fn execute(&self, args: CallArgs) -> Result<CapabilityOutcome, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(args.step_id.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let delay = args.param("delay_ms").and_then(Value::as_u64).unwrap_or(50);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);

        if args.param("fail").and_then(Value::as_bool).unwrap_or(false) {
            Ok(CapabilityOutcome::fail(format!("{} found differences", args.step_id)))
        } else {
            Ok(CapabilityOutcome::pass(format!("{} ok", args.step_id)))
        }
    }
}

/// Always panics
pub struct PanickingCapability;

#[async_trait]
impl Capability for PanickingCapability {
    async fn execute(&self, args: CallArgs) -> Result<CapabilityOutcome, CapabilityError> {
        panic!("validator for {} blew up", args.step_id);
    }
}

/// Always returns a capability error
pub struct BrokenCapability;

#[async_trait]
impl Capability for BrokenCapability {
    async fn execute(&self, _args: CallArgs) -> Result<CapabilityOutcome, CapabilityError> {
        Err(CapabilityError::Failed("connection refused".to_string()))
    }
}

/// Builtins plus `tracked`, `panic` and `broken`
pub fn registry_with(tracker: Arc<TrackingCapability>) -> StepRegistry {
    let mut registry = StepRegistry::with_builtins();
    registry.register_arc("tracked", tracker);
    registry.register("panic", PanickingCapability);
    registry.register("broken", BrokenCapability);
    registry
}

pub fn runner_with(tracker: Arc<TrackingCapability>) -> PipelineRunner {
    PipelineRunner::new(
        StepExecutor::new(Arc::new(registry_with(tracker))),
        RunnerConfig::default(),
    )
}

pub fn runner() -> PipelineRunner {
    runner_with(TrackingCapability::new())
}

pub fn pipeline_from_yaml(yaml: &str) -> PipelineSpec {
    PipelineSpec::from_yaml(yaml).expect("Should parse pipeline YAML")
}

/// Collects every event a runner emits
pub fn record_events(runner: &mut PipelineRunner) -> Arc<Mutex<Vec<ExecutionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    runner.add_event_handler(move |event| sink.lock().unwrap().push(event));
    events
}

/// Step ids of each `LevelStarted` event, in emission order
pub fn started_levels(events: &[ExecutionEvent]) -> Vec<Vec<String>> {
    events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::LevelStarted { step_ids, .. } => Some(step_ids.clone()),
            _ => None,
        })
        .collect()
}

pub fn orchestrator(runner: PipelineRunner, catalog: InMemoryCatalog) -> (JobOrchestrator, Arc<InMemorySink>) {
    let sink = Arc::new(InMemorySink::new());
    let orchestrator = JobOrchestrator::new(Arc::new(runner.with_sink(sink.clone())), Arc::new(catalog))
        .with_sink(sink.clone());
    (orchestrator, sink)
}

pub fn assert_step_status(run: &PipelineRunResult, step_id: &str, expected: StepStatus) {
    let step = run
        .step(step_id)
        .unwrap_or_else(|| panic!("Step '{}' missing from run. Steps: {:?}", step_id, step_ids(run)));
    assert_eq!(
        step.status, expected,
        "Step '{}' expected {:?}, got {:?} ({})",
        step_id, expected, step.status, step.message
    );
}

pub fn step_ids(run: &PipelineRunResult) -> Vec<String> {
    run.steps.iter().map(|s| s.step_id.clone()).collect()
}
