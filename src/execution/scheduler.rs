//! Execution scheduler - groups steps into dependency levels

use crate::core::{error::ConfigurationError, step::StepSpec};
use std::collections::HashSet;

/// Steps whose dependencies are all placed in earlier levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLevel {
    /// Position of the level, starting at 0
    pub index: usize,

    /// Step IDs in declaration order
    pub step_ids: Vec<String>,
}

impl ExecutionLevel {
    pub fn len(&self) -> usize {
        self.step_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_ids.is_empty()
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.step_ids.iter().any(|id| id == step_id)
    }
}

/// Group steps into execution levels
///
/// Kahn-style leveling: each round places every remaining step whose
/// dependencies were placed in earlier rounds. Declaration order is kept
/// inside a level. Fails before anything runs if an id is empty or
/// duplicated, a dependency is unknown, or the graph has a cycle.
pub fn build_levels(steps: &[StepSpec]) -> Result<Vec<ExecutionLevel>, ConfigurationError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(steps.len());
    for (position, step) in steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(ConfigurationError::EmptyStepId(position));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(ConfigurationError::DuplicateStep(step.id.clone()));
        }
    }

    for step in steps {
        if let Some(dep) = step.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(ConfigurationError::UnknownDependency {
                step: step.id.clone(),
                dependency: dep.clone(),
            });
        }
    }

    let mut levels = Vec::new();
    let mut placed: HashSet<&str> = HashSet::with_capacity(steps.len());
    let mut remaining: Vec<&StepSpec> = steps.iter().collect();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&StepSpec>, Vec<&StepSpec>) = remaining
            .into_iter()
            .partition(|step| step.dependencies_met(&placed));

        if ready.is_empty() {
            return Err(ConfigurationError::Cycle {
                steps: blocked.iter().map(|s| s.id.clone()).collect(),
            });
        }

        placed.extend(ready.iter().map(|s| s.id.as_str()));
        levels.push(ExecutionLevel {
            index: levels.len(),
            step_ids: ready.iter().map(|s| s.id.clone()).collect(),
        });
        remaining = blocked;
    }

    Ok(levels)
}

/// Validated levels for one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub levels: Vec<ExecutionLevel>,
}

impl ExecutionPlan {
    pub fn build(steps: &[StepSpec]) -> Result<Self, ConfigurationError> {
        Ok(Self {
            levels: build_levels(steps)?,
        })
    }

    pub fn step_count(&self) -> usize {
        self.levels.iter().map(ExecutionLevel::len).sum()
    }

    /// Index of the level a step was placed in
    pub fn level_of(&self, step_id: &str) -> Option<usize> {
        self.levels
            .iter()
            .find(|level| level.contains(step_id))
            .map(|level| level.index)
    }

    /// Widest level, useful for sizing worker pools
    pub fn max_width(&self) -> usize {
        self.levels.iter().map(ExecutionLevel::len).max().unwrap_or(0)
    }
}
