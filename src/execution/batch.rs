//! Batch job orchestrator - runs many pipelines as one job

use crate::{
    core::{
        catalog::PipelineCatalog,
        context::Resources,
        error::OrchestratorError,
        job::BatchJob,
        pipeline::PipelineRunResult,
        state::{ExecutionMode, JobStatus, OperationStatus, Progress},
    },
    execution::{executor::panic_message, runner::PipelineRunner},
    persistence::ResultSink,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Finished jobs kept for queries before the oldest are dropped
pub const DEFAULT_RETAINED_JOBS: usize = 256;

/// A batch job submission
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub name: String,

    /// Pipeline references, resolved through the catalog
    pub pipeline_refs: Vec<String>,

    pub mode: ExecutionMode,

    /// Worker pool size in PARALLEL mode
    pub max_parallel: usize,

    pub stop_on_error: bool,
}

impl JobRequest {
    pub fn new<I, S>(name: impl Into<String>, pipeline_refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            pipeline_refs: pipeline_refs.into_iter().map(Into::into).collect(),
            mode: ExecutionMode::Sequential,
            max_parallel: 1,
            stop_on_error: false,
        }
    }

    pub fn parallel(mut self, max_parallel: usize) -> Self {
        self.mode = ExecutionMode::Parallel;
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    fn worker_count(&self) -> usize {
        match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self.max_parallel,
        }
    }
}

/// How one operation ended, before it is applied to the job
enum OperationOutcome {
    Ran(PipelineRunResult),
    Failed(String),
}

/// Per-job state; `job` is the only place operation state is written
struct JobHandle {
    job: Mutex<BatchJob>,
    cancelled: AtomicBool,
    /// Set by stop_on_error; no new operation is dispatched afterwards
    stopped: AtomicBool,
    done: watch::Sender<bool>,
}

impl JobHandle {
    fn halted(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst)
    }
}

/// Everything a job driver needs, cloned into its task
#[derive(Clone)]
struct Shared {
    runner: Arc<PipelineRunner>,
    catalog: Arc<dyn PipelineCatalog>,
    resources: Arc<Resources>,
    sink: Option<Arc<dyn ResultSink>>,
    /// Finished job IDs, oldest first
    finished: Arc<Mutex<VecDeque<Uuid>>>,
}

/// Runs batch jobs in the background and answers status queries
pub struct JobOrchestrator {
    shared: Shared,
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
    retained_jobs: usize,
}

impl JobOrchestrator {
    pub fn new(runner: Arc<PipelineRunner>, catalog: Arc<dyn PipelineCatalog>) -> Self {
        Self {
            shared: Shared {
                runner,
                catalog,
                resources: Arc::new(Resources::new()),
                sink: None,
                finished: Arc::new(Mutex::new(VecDeque::new())),
            },
            jobs: RwLock::new(HashMap::new()),
            retained_jobs: DEFAULT_RETAINED_JOBS,
        }
    }

    /// How many finished jobs stay queryable; older ones are dropped on the
    /// next submit and remain available through the sink
    pub fn with_retained_jobs(mut self, retained_jobs: usize) -> Self {
        self.retained_jobs = retained_jobs;
        self
    }

    /// Resources injected into every pipeline of every job
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.shared.resources = Arc::new(resources);
        self
    }

    /// Hand every terminal job to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.shared.sink = Some(sink);
        self
    }

    /// Submit a job; it starts running in the background immediately
    pub async fn submit(&self, request: JobRequest) -> Result<Uuid, OrchestratorError> {
        if request.pipeline_refs.is_empty() {
            return Err(OrchestratorError::EmptyJob);
        }
        if request.max_parallel == 0 {
            return Err(OrchestratorError::InvalidParallelism);
        }

        let job = BatchJob::new(
            request.name.clone(),
            &request.pipeline_refs,
            request.mode,
            request.max_parallel,
            request.stop_on_error,
        );
        let job_id = job.job_id;
        let (done, _) = watch::channel(false);
        let handle = Arc::new(JobHandle {
            job: Mutex::new(job),
            cancelled: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            done,
        });

        self.evict_finished().await;
        self.jobs.write().await.insert(job_id, handle.clone());

        info!(
            "Submitted job {} ({}): {} pipelines, {:?} on {} workers",
            request.name,
            job_id,
            request.pipeline_refs.len(),
            request.mode,
            request.worker_count()
        );

        tokio::spawn(drive_job(self.shared.clone(), handle, request.worker_count()));

        Ok(job_id)
    }

    /// Drop the oldest finished jobs beyond the retention limit
    async fn evict_finished(&self) {
        let mut finished = self.shared.finished.lock().await;
        if finished.len() <= self.retained_jobs {
            return;
        }

        let mut jobs = self.jobs.write().await;
        while finished.len() > self.retained_jobs {
            if let Some(job_id) = finished.pop_front() {
                jobs.remove(&job_id);
                debug!("Evicted finished job {}", job_id);
            }
        }
    }

    async fn handle(&self, job_id: Uuid) -> Result<Arc<JobHandle>, OrchestratorError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(OrchestratorError::JobNotFound(job_id))
    }

    /// Most recent consistent snapshot of a job
    pub async fn get_job(&self, job_id: Uuid) -> Result<BatchJob, OrchestratorError> {
        let handle = self.handle(job_id).await?;
        let job = handle.job.lock().await;
        Ok(job.clone())
    }

    pub async fn get_progress(&self, job_id: Uuid) -> Result<Progress, OrchestratorError> {
        let handle = self.handle(job_id).await?;
        let job = handle.job.lock().await;
        Ok(job.progress)
    }

    /// IDs of all known jobs
    pub async fn job_ids(&self) -> Vec<Uuid> {
        self.jobs.read().await.keys().copied().collect()
    }

    /// Cancel a job
    ///
    /// Every non-terminal operation becomes CANCELLED at once. Operations
    /// already running finish in the background and their results are
    /// discarded. Cancelling a finished job has no effect.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), OrchestratorError> {
        let handle = self.handle(job_id).await?;
        let mut job = handle.job.lock().await;
        if job.status.is_terminal() {
            debug!("Job {} already finished, ignoring cancel", job_id);
            return Ok(());
        }

        handle.cancelled.store(true, Ordering::SeqCst);
        let now = Utc::now();
        for op in job.operations.iter_mut().filter(|op| !op.status.is_terminal()) {
            op.status = OperationStatus::Cancelled;
            op.completed_at = Some(now);
        }
        job.status = JobStatus::Cancelled;
        job.refresh_progress();

        info!("Cancelled job {} ({})", job.name, job_id);
        Ok(())
    }

    /// Wait until the job's workers have drained and return the final snapshot
    pub async fn wait(&self, job_id: Uuid) -> Result<BatchJob, OrchestratorError> {
        let handle = self.handle(job_id).await?;
        let mut done = handle.done.subscribe();
        // The sender lives in the handle, so this only ends once the job is done
        let _ = done.wait_for(|finished| *finished).await;
        let job = handle.job.lock().await;
        Ok(job.clone())
    }
}

async fn drive_job(shared: Shared, handle: Arc<JobHandle>, workers: usize) {
    let queue: VecDeque<usize> = {
        let mut job = handle.job.lock().await;
        if !handle.cancelled.load(Ordering::SeqCst) {
            job.status = JobStatus::Running;
        }
        (0..job.operations.len()).collect()
    };
    let queue = Arc::new(Mutex::new(queue));

    let mut pool = JoinSet::new();
    for worker in 0..workers {
        pool.spawn(worker_loop(shared.clone(), handle.clone(), queue.clone(), worker));
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            error!("Job worker died: {}", e);
        }
    }

    finish_job(&shared, &handle).await;
}

async fn worker_loop(
    shared: Shared,
    handle: Arc<JobHandle>,
    queue: Arc<Mutex<VecDeque<usize>>>,
    worker: usize,
) {
    loop {
        if handle.halted() {
            break;
        }
        let next = queue.lock().await.pop_front();
        let Some(index) = next else { break };

        let (job_id, pipeline_ref) = {
            let mut job = handle.job.lock().await;
            if handle.halted() {
                break;
            }
            let job_id = job.job_id;
            let op = &mut job.operations[index];
            if op.status != OperationStatus::Pending {
                continue;
            }
            op.status = OperationStatus::Running;
            op.started_at = Some(Utc::now());
            (job_id, op.pipeline_ref.clone())
        };

        debug!("Worker {} of job {} running {}", worker, job_id, pipeline_ref);
        let outcome = run_operation(&shared, pipeline_ref.clone()).await;

        let mut job = handle.job.lock().await;
        let stop_on_error = job.stop_on_error;
        let op = &mut job.operations[index];
        if op.status == OperationStatus::Cancelled {
            info!(
                "Discarding result of {} in cancelled job {}",
                pipeline_ref, job_id
            );
            continue;
        }

        match outcome {
            OperationOutcome::Ran(run) => {
                op.status = if run.passed() {
                    OperationStatus::Completed
                } else {
                    OperationStatus::Failed
                };
                op.result = Some(run);
            }
            OperationOutcome::Failed(message) => {
                warn!("Operation {} in job {} failed: {}", pipeline_ref, job_id, message);
                op.status = OperationStatus::Failed;
                op.error = Some(message);
            }
        }
        op.completed_at = Some(Utc::now());
        let failed = op.status == OperationStatus::Failed;
        info!(
            "Operation {} in job {}: {:?}",
            pipeline_ref, job_id, op.status
        );

        job.refresh_progress();
        if failed && stop_on_error {
            info!("Job {} stopping after failed operation {}", job_id, pipeline_ref);
            handle.stopped.store(true, Ordering::SeqCst);
        }
    }
}

/// Resolve and run one pipeline on its own task so a panic only fails this operation
async fn run_operation(shared: &Shared, pipeline_ref: String) -> OperationOutcome {
    let runner = shared.runner.clone();
    let catalog = shared.catalog.clone();
    let resources = shared.resources.clone();

    let task = tokio::spawn(async move {
        let spec = match catalog.resolve(&pipeline_ref) {
            Ok(spec) => spec,
            Err(e) => {
                return OperationOutcome::Failed(format!(
                    "failed to resolve pipeline '{}': {:#}",
                    pipeline_ref, e
                ))
            }
        };
        match runner.run(&spec, &resources).await {
            Ok(run) => OperationOutcome::Ran(run),
            Err(e) => OperationOutcome::Failed(format!("configuration error: {}", e)),
        }
    });

    match task.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!("Operation panicked: {}", message);
            OperationOutcome::Failed(format!("operation panicked: {}", message))
        }
        Err(e) => OperationOutcome::Failed(format!("operation task failed: {}", e)),
    }
}

async fn finish_job(shared: &Shared, handle: &JobHandle) {
    let snapshot = {
        let mut job = handle.job.lock().await;
        let now = Utc::now();

        // Left over after stop_on_error
        for op in job
            .operations
            .iter_mut()
            .filter(|op| op.status == OperationStatus::Pending)
        {
            op.status = OperationStatus::Cancelled;
            op.completed_at = Some(now);
        }

        job.status = if handle.cancelled.load(Ordering::SeqCst) {
            JobStatus::Cancelled
        } else if job.operations.iter().any(|op| {
            matches!(
                op.status,
                OperationStatus::Failed | OperationStatus::Cancelled
            )
        }) {
            JobStatus::PartialFailure
        } else {
            JobStatus::Completed
        };
        job.completed_at = Some(now);
        job.refresh_progress();
        job.clone()
    };

    info!(
        "Job {} ({}) finished: {} ({} completed, {} failed, {} cancelled)",
        snapshot.name,
        snapshot.job_id,
        snapshot.status.as_str(),
        snapshot.count(OperationStatus::Completed),
        snapshot.count(OperationStatus::Failed),
        snapshot.count(OperationStatus::Cancelled)
    );

    if let Some(sink) = &shared.sink {
        if let Err(e) = sink.save_job(&snapshot).await {
            warn!("Failed to store job {}: {:#}", snapshot.job_id, e);
        }
    }

    shared.finished.lock().await.push_back(snapshot.job_id);
    handle.done.send_replace(true);
}
