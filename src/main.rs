use anyhow::{Context, Result};
use migration_validator::cli::commands::{
    BatchCommand, HistoryCommand, ReportCommand, RunCommand, ValidateCommand,
};
use migration_validator::cli::output::*;
use migration_validator::cli::{Cli, Command};
use migration_validator::core::config::Settings;
use migration_validator::core::{FileCatalog, JobStatus, PipelineSpec, Resources};
use migration_validator::execution::{
    JobOrchestrator, JobRequest, PipelineRunner, RunnerConfig, StepExecutor,
};
use migration_validator::persistence::{InMemorySink, ResultSink};
use migration_validator::registry::StepRegistry;
use migration_validator::report::{ReportAggregator, ReportService, ReportTarget};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set logging subscriber")?;

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    debug!("Loaded settings: {:?}", settings);

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &settings).await?,
        Command::Validate(cmd) => validate_pipeline(cmd, &settings)?,
        Command::Batch(cmd) => run_batch(cmd, &settings).await?,
        Command::Report(cmd) => show_report(cmd, &settings).await?,
        Command::History(cmd) => show_history(cmd, &settings).await?,
    }

    Ok(())
}

fn build_registry(settings: &Settings) -> Arc<StepRegistry> {
    Arc::new(StepRegistry::with_builtins().with_external_validators(&settings.validators))
}

#[cfg(feature = "sqlite")]
async fn open_store(settings: &Settings) -> Result<Arc<dyn ResultSink>> {
    let path = settings.database_path();
    let store = migration_validator::persistence::SqliteResultStore::open(&path)
        .await
        .with_context(|| format!("Failed to open result store {}", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_settings: &Settings) -> Result<Arc<dyn ResultSink>> {
    anyhow::bail!("stored results require the `sqlite` feature")
}

async fn history_sink(no_history: bool, settings: &Settings) -> Result<Arc<dyn ResultSink>> {
    if no_history {
        Ok(Arc::new(InMemorySink::new()))
    } else {
        open_store(settings).await
    }
}

async fn run_pipeline(cmd: &RunCommand, settings: &Settings) -> Result<()> {
    let mut spec = PipelineSpec::from_file(&cmd.file)?;
    if cmd.stop_on_error {
        spec.stop_on_error = true;
    }
    if let Some(max) = cmd.max_concurrency {
        anyhow::ensure!(max > 0, "--max-concurrency must be at least 1");
        spec.max_concurrency = Some(max);
    }

    let sink = history_sink(cmd.no_history, settings).await?;
    let mut runner = PipelineRunner::new(
        StepExecutor::new(build_registry(settings)),
        RunnerConfig::from(&settings.runner),
    )
    .with_sink(sink);

    if !cmd.json {
        runner.add_event_handler(|event| println!("{}", format_execution_event(&event)));
    }

    let resources = Resources::from_connection_strings(&settings.connections);
    let run = match runner.run(&spec, &resources).await {
        Ok(run) => run,
        Err(e) => {
            println!("{} Invalid pipeline {}:", CROSS, style(&spec.name).bold());
            println!("  {}", style(e).red());
            std::process::exit(2);
        }
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("{}", separator());
        let duration = Duration::from_millis(run.duration_ms());
        if run.passed() {
            println!(
                "{} {} {} in {}",
                CHECK,
                style(&run.pipeline_name).bold(),
                style("passed").green(),
                format_duration(duration)
            );
        } else {
            println!(
                "{} {} {} in {}",
                CROSS,
                style(&run.pipeline_name).bold(),
                style("failed").red(),
                format_duration(duration)
            );
        }
        if !cmd.no_history {
            println!("{} Result stored (run ID: {})", INFO, style(run.run_id).dim());
        }
    }

    if !run.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand, settings: &Settings) -> Result<()> {
    let spec = PipelineSpec::from_file(&cmd.file)?;
    let levels = match spec.validate() {
        Ok(levels) => levels,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    };

    let registry = build_registry(settings);
    let unknown: Vec<&str> = spec
        .steps
        .iter()
        .filter(|s| !registry.contains(&s.step_type))
        .map(|s| s.step_type.as_str())
        .collect();

    if cmd.json {
        let data = serde_json::json!({
            "name": spec.name,
            "levels": levels.iter().map(|l| &l.step_ids).collect::<Vec<_>>(),
            "unknown_step_types": unknown,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Pipeline definition is valid!", CHECK);
    println!("  Name: {}", style(&spec.name).bold());
    println!("  Steps: {}", style(spec.steps.len()).cyan());
    for level in &levels {
        println!(
            "  Level {}: {}",
            level.index,
            style(level.step_ids.join(", ")).cyan()
        );
    }
    for step_type in unknown {
        println!(
            "{} Step type {} is not registered; those steps will end in ERROR",
            WARN,
            style(step_type).yellow()
        );
    }
    Ok(())
}

async fn run_batch(cmd: &BatchCommand, settings: &Settings) -> Result<()> {
    let sink = history_sink(cmd.no_history, settings).await?;
    let runner = PipelineRunner::new(
        StepExecutor::new(build_registry(settings)),
        RunnerConfig::from(&settings.runner),
    )
    .with_sink(sink.clone());

    let orchestrator = JobOrchestrator::new(Arc::new(runner), Arc::new(FileCatalog::new(PathBuf::new())))
        .with_resources(Resources::from_connection_strings(&settings.connections))
        .with_sink(sink);

    let request = JobRequest {
        name: cmd.name.clone(),
        pipeline_refs: cmd.file.iter().map(|p| p.display().to_string()).collect(),
        mode: cmd.mode.into(),
        max_parallel: cmd.max_parallel.unwrap_or(settings.batch.max_parallel),
        stop_on_error: cmd.stop_on_error,
    };
    let job_id = orchestrator.submit(request).await?;

    println!(
        "{} Submitted job {} ({} pipelines)",
        ROCKET,
        style(&cmd.name).bold(),
        cmd.file.len()
    );

    let progress_bar = create_progress_bar();
    let waiting = orchestrator.wait(job_id);
    tokio::pin!(waiting);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    let mut cancelling = false;

    let job = loop {
        tokio::select! {
            job = &mut waiting => break job?,
            _ = ticker.tick() => {
                let progress = orchestrator.get_progress(job_id).await?;
                progress_bar.set_position((progress.percent * 100.0) as u64);
                progress_bar.set_message(format!(
                    "{}/{} pipelines ({:.2}%)",
                    progress.completed, progress.total, progress.percent
                ));
            }
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                cancelling = true;
                progress_bar.println(format!("{} Cancelling, waiting for running pipelines", WARN));
                orchestrator.cancel(job_id).await?;
            }
        }
    };
    progress_bar.finish_and_clear();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!("{}", format_job(&job));
        if !cmd.no_history {
            println!("{} Job stored (job ID: {})", INFO, style(job.job_id).dim());
        }
    }

    if job.status != JobStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid {} ID '{}'", what, raw))
}

async fn show_report(cmd: &ReportCommand, settings: &Settings) -> Result<()> {
    let target = match (&cmd.run_id, &cmd.job_id) {
        (Some(run_id), _) => ReportTarget::Run(parse_id(run_id, "run")?),
        (None, Some(job_id)) => ReportTarget::Job(parse_id(job_id, "job")?),
        (None, None) => anyhow::bail!("either --run-id or --job-id is required"),
    };

    let service = ReportService::new(
        open_store(settings).await?,
        ReportAggregator::new(settings.report.clone()),
    );
    let report = service.generate(target).await?;

    if cmd.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", format_report(&report));
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand, settings: &Settings) -> Result<()> {
    let store = open_store(settings).await?;
    let runs = store.list_runs(cmd.pipeline.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }
    Ok(())
}
