//! Pipeline runner - executes a pipeline level by level

use crate::{
    core::{
        config::RunnerSettings,
        context::Resources,
        error::ConfigurationError,
        pipeline::{PipelineRunResult, PipelineSpec},
        state::RunStatus,
        step::{ErrorKind, StepResult, StepSpec},
    },
    execution::{
        executor::StepExecutor,
        scheduler::{build_levels, ExecutionLevel},
    },
    persistence::ResultSink,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Message recorded on steps skipped after a failed level
pub const SKIPPED_MESSAGE: &str = "skipped: upstream level failed (stop_on_error)";

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
        level_count: usize,
    },
    LevelStarted {
        run_id: Uuid,
        index: usize,
        step_ids: Vec<String>,
    },
    StepFinished {
        run_id: Uuid,
        result: StepResult,
    },
    StepsSkipped {
        run_id: Uuid,
        step_ids: Vec<String>,
    },
    RunCompleted {
        run_id: Uuid,
        pipeline_name: String,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Runner-wide defaults, overridable per pipeline
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Worker cap within a level (unbounded when absent)
    pub max_concurrency: Option<usize>,

    /// Step timeout used when neither step nor pipeline sets one
    pub default_timeout: Option<Duration>,
}

impl From<&RunnerSettings> for RunnerConfig {
    fn from(settings: &RunnerSettings) -> Self {
        Self {
            max_concurrency: settings.max_concurrency,
            default_timeout: settings.default_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Executes pipelines: levels in order, steps within a level concurrently
pub struct PipelineRunner {
    executor: Arc<StepExecutor>,
    config: RunnerConfig,
    event_handlers: Vec<EventHandler>,
    sink: Option<Arc<dyn ResultSink>>,
}

impl PipelineRunner {
    pub fn new(executor: StepExecutor, config: RunnerConfig) -> Self {
        let executor = executor.with_default_timeout(config.default_timeout);
        Self {
            executor: Arc::new(executor),
            config,
            event_handlers: Vec::new(),
            sink: None,
        }
    }

    /// Hand every sealed result to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run a pipeline to completion
    ///
    /// The dependency graph is checked before any step runs; a malformed
    /// pipeline returns `ConfigurationError` and executes nothing.
    pub async fn run(
        &self,
        spec: &PipelineSpec,
        resources: &Resources,
    ) -> Result<PipelineRunResult, ConfigurationError> {
        let levels = build_levels(&spec.steps)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Starting pipeline {} ({}): {} steps in {} levels",
            spec.name,
            run_id,
            spec.steps.len(),
            levels.len()
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            pipeline_name: spec.name.clone(),
            total_steps: spec.steps.len(),
            level_count: levels.len(),
        });

        let resources = Arc::new(resources.overlay_variables(&spec.variables));
        let cap = spec.max_concurrency.or(self.config.max_concurrency);
        let pipeline_timeout = spec.default_timeout_secs.map(Duration::from_secs);
        let steps_by_id: HashMap<&str, &StepSpec> =
            spec.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut results: HashMap<String, StepResult> = HashMap::with_capacity(spec.steps.len());

        for (position, level) in levels.iter().enumerate() {
            self.emit_event(ExecutionEvent::LevelStarted {
                run_id,
                index: level.index,
                step_ids: level.step_ids.clone(),
            });

            let level_steps: Vec<StepSpec> = level
                .step_ids
                .iter()
                .filter_map(|id| steps_by_id.get(id.as_str()).map(|s| (*s).clone()))
                .collect();

            let level_results = self
                .run_level(run_id, level_steps, &resources, cap, pipeline_timeout)
                .await;
            let level_failed = level_results.iter().any(|r| r.status.is_failure());
            results.extend(level_results.into_iter().map(|r| (r.step_id.clone(), r)));

            if spec.stop_on_error && level_failed {
                let skipped = self.skip_remaining(run_id, &levels[position + 1..], &steps_by_id);
                if !skipped.is_empty() {
                    warn!(
                        "Level {} of {} failed, skipping {} remaining steps",
                        level.index,
                        spec.name,
                        skipped.len()
                    );
                }
                results.extend(skipped.into_iter().map(|r| (r.step_id.clone(), r)));
                break;
            }
        }

        // Declaration order, regardless of completion order
        let steps: Vec<StepResult> = spec
            .steps
            .iter()
            .filter_map(|step| results.remove(&step.id))
            .collect();
        let status = PipelineRunResult::derive_status(&steps);

        let run = PipelineRunResult {
            run_id,
            pipeline_name: spec.name.clone(),
            started_at,
            completed_at: Utc::now(),
            steps,
            status,
        };

        info!(
            "Pipeline {} ({}) finished: {} in {}ms",
            run.pipeline_name,
            run_id,
            status.as_str(),
            run.duration_ms()
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.save_run(&run).await {
                warn!("Failed to store run {}: {:#}", run_id, e);
            }
        }

        self.emit_event(ExecutionEvent::RunCompleted {
            run_id,
            pipeline_name: run.pipeline_name.clone(),
            status,
        });

        Ok(run)
    }

    /// Run one level with a bounded pool of workers pulling from a queue
    ///
    /// Returns once every step in the level has a terminal result.
    async fn run_level(
        &self,
        run_id: Uuid,
        steps: Vec<StepSpec>,
        resources: &Arc<Resources>,
        cap: Option<usize>,
        pipeline_timeout: Option<Duration>,
    ) -> Vec<StepResult> {
        let width = steps.len();
        let workers = cap.unwrap_or(width).min(width).max(1);
        debug!("Dispatching {} steps on {} workers", width, workers);

        let queue = Arc::new(Mutex::new(steps.iter().cloned().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();

        for _ in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let executor = self.executor.clone();
            let resources = resources.clone();
            pool.spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(step) = next else { break };
                    let result = executor.execute(&step, &resources, pipeline_timeout).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(width);
        while let Some(result) = rx.recv().await {
            self.emit_event(ExecutionEvent::StepFinished {
                run_id,
                result: result.clone(),
            });
            results.push(result);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Step worker for run {} died: {}", run_id, e);
            }
        }

        // A dead worker must not leave a step without a result
        if results.len() < width {
            for step in &steps {
                if !results.iter().any(|r| r.step_id == step.id) {
                    let result = StepResult::error(
                        step,
                        ErrorKind::Panicked,
                        "step worker stopped before producing a result",
                        Utc::now(),
                        0,
                    );
                    self.emit_event(ExecutionEvent::StepFinished {
                        run_id,
                        result: result.clone(),
                    });
                    results.push(result);
                }
            }
        }

        results
    }

    fn skip_remaining(
        &self,
        run_id: Uuid,
        levels: &[ExecutionLevel],
        steps_by_id: &HashMap<&str, &StepSpec>,
    ) -> Vec<StepResult> {
        let skipped: Vec<StepResult> = levels
            .iter()
            .flat_map(|level| level.step_ids.iter())
            .filter_map(|id| steps_by_id.get(id.as_str()))
            .map(|step| StepResult::skipped(step, SKIPPED_MESSAGE))
            .collect();

        if !skipped.is_empty() {
            self.emit_event(ExecutionEvent::StepsSkipped {
                run_id,
                step_ids: skipped.iter().map(|r| r.step_id.clone()).collect(),
            });
        }
        skipped
    }
}
