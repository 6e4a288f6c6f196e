//! Pipeline documents and engine settings from YAML

use crate::core::{error::ConfigurationError, pipeline::PipelineSpec};
use crate::execution::scheduler::{build_levels, ExecutionLevel};
use crate::report::ReportConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

impl PipelineSpec {
    /// Load a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse pipeline file {}", path.display()))
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let spec: PipelineSpec = serde_yaml::from_str(yaml)?;
        Ok(spec)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the dependency graph and return its execution levels
    pub fn validate(&self) -> std::result::Result<Vec<ExecutionLevel>, ConfigurationError> {
        build_levels(&self.steps)
    }
}

/// Engine settings, loaded from `--config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runner: RunnerSettings,

    pub batch: BatchSettings,

    /// Named connection strings handed to steps as opaque handles
    pub connections: BTreeMap<String, String>,

    /// External validator commands, registered by name
    pub validators: BTreeMap<String, ExternalValidatorConfig>,

    pub report: ReportConfig,

    /// SQLite database path for stored results
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Worker cap within a level (unbounded when absent)
    pub max_concurrency: Option<usize>,

    /// Step timeout used when neither step nor pipeline sets one
    pub default_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker pool size for parallel batch jobs
    pub max_parallel: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

/// An external validator executable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalValidatorConfig {
    /// Executable to spawn
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Parameters the validator requires
    #[serde(default)]
    pub required_params: Vec<String>,

    /// Kill the process after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml).context("Invalid settings")?;
        if settings.batch.max_parallel == 0 {
            anyhow::bail!("batch.max_parallel must be at least 1");
        }
        if settings.runner.max_concurrency == Some(0) {
            anyhow::bail!("runner.max_concurrency must be at least 1");
        }
        Ok(settings)
    }

    /// Load from an optional path, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Database path, defaulting to the user's local data directory
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => path.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("migration-validator")
                .join("results.db"),
        }
    }
}
