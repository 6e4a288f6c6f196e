//! SQLite-based result store

use crate::core::{job::BatchJob, pipeline::PipelineRunResult, state::RunStatus};
use crate::persistence::{ResultSink, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// SQLite result store
///
/// Runs and jobs are stored as JSON payloads; the summary columns next to
/// them exist for listing and filtering without decoding the payload.
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Open (or create) a store at `db_path`; `:memory:` gives a private database
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // Each in-memory connection would see its own database
        let max_connections = if db_path == ":memory:" { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Open the store at a file path, creating parent directories
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let db_path = path
            .to_str()
            .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                total_steps INTEGER NOT NULL DEFAULT 0,
                passed_steps INTEGER NOT NULL DEFAULT 0,
                failed_steps INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline_name)",
            "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                payload TEXT NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }

        Ok(())
    }

    fn to_text(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn from_text(raw: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid timestamp '{}'", raw))?
            .with_timezone(&Utc))
    }

    fn summary_from_row(row: &SqliteRow) -> Result<RunSummary> {
        let status: String = row.get("status");
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("run_id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: RunStatus::parse(&status)
                .with_context(|| format!("Unknown run status '{}'", status))?,
            started_at: Self::from_text(&row.get::<String, _>("started_at"))?,
            completed_at: Self::from_text(&row.get::<String, _>("completed_at"))?,
            total_steps: row.get::<i64, _>("total_steps") as usize,
            passed_steps: row.get::<i64, _>("passed_steps") as usize,
            failed_steps: row.get::<i64, _>("failed_steps") as usize,
        })
    }
}

#[async_trait::async_trait]
impl ResultSink for SqliteResultStore {
    async fn save_run(&self, run: &PipelineRunResult) -> Result<()> {
        let summary = RunSummary::from(run);
        let payload = serde_json::to_string(run).context("Failed to encode run")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (run_id, pipeline_name, status, started_at, completed_at, total_steps, passed_steps, failed_steps, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(summary.run_id.to_string())
        .bind(&summary.pipeline_name)
        .bind(summary.status.as_str())
        .bind(Self::to_text(summary.started_at))
        .bind(Self::to_text(summary.completed_at))
        .bind(summary.total_steps as i64)
        .bind(summary.passed_steps as i64)
        .bind(summary.failed_steps as i64)
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn save_job(&self, job: &BatchJob) -> Result<()> {
        let payload = serde_json::to_string(job).context("Failed to encode job")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO jobs
            (job_id, name, status, created_at, completed_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(job.job_id.to_string())
        .bind(&job.name)
        .bind(job.status.as_str())
        .bind(Self::to_text(job.created_at))
        .bind(job.completed_at.map(Self::to_text))
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Failed to save job")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<PipelineRunResult>> {
        let row = sqlx::query("SELECT payload FROM runs WHERE run_id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.map(|row| {
            serde_json::from_str(&row.get::<String, _>("payload"))
                .with_context(|| format!("Corrupt payload for run {}", run_id))
        })
        .transpose()
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<BatchJob>> {
        let row = sqlx::query("SELECT payload FROM jobs WHERE job_id = ?1")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load job")?;

        row.map(|row| {
            serde_json::from_str(&row.get::<String, _>("payload"))
                .with_context(|| format!("Corrupt payload for job {}", job_id))
        })
        .transpose()
    }

    async fn list_runs(&self, pipeline: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, pipeline_name, status, started_at, completed_at,
                   total_steps, passed_steps, failed_steps
            FROM runs
            WHERE ?1 IS NULL OR pipeline_name = ?1
            ORDER BY started_at DESC, run_id ASC
            LIMIT ?2
            "#,
        )
        .bind(pipeline)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::summary_from_row).collect()
    }
}
