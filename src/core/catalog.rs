//! Resolution of pipeline references used by batch jobs

use crate::core::pipeline::PipelineSpec;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Resolves a pipeline reference to its definition
pub trait PipelineCatalog: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<PipelineSpec>;
}

/// Catalog holding definitions in memory, keyed by pipeline name
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pipelines: HashMap<String, PipelineSpec>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: PipelineSpec) {
        self.pipelines.insert(spec.name.clone(), spec);
    }

    pub fn with(mut self, spec: PipelineSpec) -> Self {
        self.insert(spec);
        self
    }
}

impl PipelineCatalog for InMemoryCatalog {
    fn resolve(&self, reference: &str) -> Result<PipelineSpec> {
        self.pipelines
            .get(reference)
            .cloned()
            .with_context(|| format!("Unknown pipeline '{}'", reference))
    }
}

/// Catalog reading YAML files, references are paths relative to `root`
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
}

impl FileCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PipelineCatalog for FileCatalog {
    fn resolve(&self, reference: &str) -> Result<PipelineSpec> {
        PipelineSpec::from_file(self.root.join(reference))
    }
}
