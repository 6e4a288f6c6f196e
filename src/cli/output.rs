//! CLI output formatting

use crate::{
    core::{
        job::{BatchJob, Operation},
        state::{JobStatus, OperationStatus, RunStatus},
        step::{Severity, StepResult, StepStatus},
    },
    execution::ExecutionEvent,
    persistence::RunSummary,
    report::{Priority, Report},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a percentage progress bar for batch jobs
pub fn create_progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(10_000);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    "─".repeat(width)
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Pass => style("PASS").green().to_string(),
        StepStatus::Fail => style("FAIL").red().to_string(),
        StepStatus::Error => style("ERROR").red().bold().to_string(),
        StepStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

pub fn format_severity(severity: Severity) -> String {
    let label = format!("{:?}", severity).to_lowercase();
    match severity {
        Severity::Info => style(label).dim().to_string(),
        Severity::Warning => style(label).yellow().to_string(),
        Severity::Error => style(label).red().to_string(),
        Severity::Blocker => style(label).red().bold().to_string(),
    }
}

pub fn format_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Passed => style("PASSED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

pub fn format_job_status(status: JobStatus) -> String {
    let label = status.as_str();
    match status {
        JobStatus::Pending => style(label).dim().to_string(),
        JobStatus::Running => style(label).yellow().to_string(),
        JobStatus::Completed => style(label).green().to_string(),
        JobStatus::PartialFailure => style(label).red().to_string(),
        JobStatus::Cancelled => style(label).yellow().to_string(),
    }
}

fn format_priority(priority: Priority) -> String {
    let label = priority.as_str().to_uppercase();
    match priority {
        Priority::Critical => style(label).red().bold().to_string(),
        Priority::High => style(label).red().to_string(),
        Priority::Medium => style(label).yellow().to_string(),
        Priority::Low => style(label).dim().to_string(),
    }
}

/// One line per finished step
pub fn format_step_result(result: &StepResult) -> String {
    let icon = match result.status {
        StepStatus::Pass => CHECK,
        StepStatus::Fail => CROSS,
        StepStatus::Error => WARN,
        StepStatus::Skipped => SKIP,
    };
    format!(
        "{} {} {} [{}] {} {}",
        icon,
        style(&result.step_id).cyan(),
        format_step_status(result.status),
        format_severity(result.severity),
        result.message,
        style(format!("({}ms)", result.duration_ms)).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            total_steps,
            level_count,
        } => format!(
            "{} Starting pipeline {} ({}): {} steps in {} levels",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim(),
            total_steps,
            level_count
        ),
        ExecutionEvent::LevelStarted {
            index, step_ids, ..
        } => format!(
            "{} Level {}: {}",
            SPINNER,
            index,
            style(step_ids.join(", ")).dim()
        ),
        ExecutionEvent::StepFinished { result, .. } => {
            format!("  {}", format_step_result(result))
        }
        ExecutionEvent::StepsSkipped { step_ids, .. } => format!(
            "{} Skipping {} after failed level: {}",
            SKIP,
            step_ids.len(),
            style(step_ids.join(", ")).dim()
        ),
        ExecutionEvent::RunCompleted {
            run_id,
            pipeline_name,
            status,
        } => format!(
            "{} Pipeline {} ({}) {}",
            INFO,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim(),
            format_run_status(*status)
        ),
    }
}

/// Format a stored run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let icon = match summary.status {
        RunStatus::Passed => CHECK,
        RunStatus::Failed => CROSS,
    };

    format!(
        "{} {} - {} - {} ({}/{} passed, {} failed) - {}",
        icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_run_status(summary.status),
        summary.passed_steps,
        summary.total_steps,
        summary.failed_steps,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

fn format_operation(op: &Operation) -> String {
    let (icon, label) = match op.status {
        OperationStatus::Completed => (CHECK, style("COMPLETED").green()),
        OperationStatus::Failed => (CROSS, style("FAILED").red()),
        OperationStatus::Cancelled => (SKIP, style("CANCELLED").yellow()),
        OperationStatus::Running => (SPINNER, style("RUNNING").yellow()),
        OperationStatus::Pending => (INFO, style("PENDING").dim()),
    };

    let detail = match (&op.result, &op.error) {
        (Some(run), _) => format!(
            "run {} {}",
            short_id(&run.run_id),
            format_run_status(run.status)
        ),
        (None, Some(error)) => style(error).red().to_string(),
        (None, None) => String::new(),
    };

    format!("{} {} {} {}", icon, style(&op.pipeline_ref).bold(), label, detail)
}

/// Final per-operation table of a batch job
pub fn format_job(job: &BatchJob) -> String {
    let mut lines = vec![format!(
        "{} Job {} ({}) {} - {}/{} operations finished",
        INFO,
        style(&job.name).bold(),
        style(job.job_id).dim(),
        format_job_status(job.status),
        job.progress.completed,
        job.progress.total
    )];
    lines.extend(job.operations.iter().map(|op| format!("  {}", format_operation(op))));
    lines.join("\n")
}

/// Human-readable report
pub fn format_report(report: &Report) -> String {
    let summary = &report.summary;
    let mut lines = vec![
        style("Executive summary").bold().to_string(),
        format!(
            "  Runs: {} ({} passed, {} failed) - overall {}",
            summary.run_count,
            summary.runs_passed,
            summary.runs_failed,
            format_run_status(summary.overall_status)
        ),
        format!(
            "  Steps: {} total, {} passed, {} failed, {} errors, {} skipped",
            summary.total_steps, summary.passed, summary.failed, summary.errors, summary.skipped
        ),
        format!("  Pass rate: {}", style(format!("{:.2}%", summary.pass_rate)).cyan()),
    ];

    if summary.operations_failed + summary.operations_cancelled > 0 {
        lines.push(format!(
            "  Operations without a run: {} failed, {} cancelled",
            summary.operations_failed, summary.operations_cancelled
        ));
    }

    if !report.metrics.totals.is_empty() {
        lines.push(style("Metrics").bold().to_string());
        for (key, value) in &report.metrics.totals {
            lines.push(format!("  {}: {}", key, value));
        }
    }

    if !report.root_causes.is_empty() {
        lines.push(style("Root causes").bold().to_string());
        for group in &report.root_causes {
            lines.push(format!(
                "  {} - {} steps, {} errors, max severity {}",
                style(&group.category).cyan(),
                group.affected_steps,
                group.total_errors,
                format_severity(group.max_severity)
            ));
            for message in &group.sample_messages {
                lines.push(format!("    {}", style(message).dim()));
            }
        }
    }

    if !report.recommendations.is_empty() {
        lines.push(style("Recommendations").bold().to_string());
        for rec in &report.recommendations {
            lines.push(format!("  [{}] {}", format_priority(rec.priority), rec.action));
        }
    }

    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
