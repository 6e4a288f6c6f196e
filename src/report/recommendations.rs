//! Priority tiers for root-cause groups

use crate::core::step::Severity;
use crate::report::categories::RootCauseGroup;
use serde::{Deserialize, Serialize};

/// Priority tier, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Tier for a group given the escalation threshold
    pub fn classify(group: &RootCauseGroup, escalation_threshold: u64) -> Self {
        match group.max_severity {
            Severity::Blocker => Priority::Critical,
            Severity::Error => Priority::High,
            _ if group.total_errors > escalation_threshold => Priority::High,
            Severity::Warning => Priority::Medium,
            Severity::Info => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,

    pub category: String,

    pub affected_steps: usize,

    pub total_errors: u64,

    pub action: String,
}

impl Recommendation {
    pub fn for_group(group: &RootCauseGroup, escalation_threshold: u64) -> Self {
        let priority = Priority::classify(group, escalation_threshold);
        let action = match priority {
            Priority::Critical => format!(
                "Resolve blocking {} failures in {} steps before cutover",
                group.category, group.affected_steps
            ),
            Priority::High => format!(
                "Fix {} {} errors across {} steps before sign-off",
                group.total_errors, group.category, group.affected_steps
            ),
            Priority::Medium => format!(
                "Review {} {} warnings",
                group.affected_steps, group.category
            ),
            Priority::Low => format!(
                "Track {} informational {} findings",
                group.affected_steps, group.category
            ),
        };

        Self {
            priority,
            category: group.category.clone(),
            affected_steps: group.affected_steps,
            total_errors: group.total_errors,
            action,
        }
    }
}

/// One recommendation per group, sorted by priority then category
pub fn recommend(groups: &[RootCauseGroup], escalation_threshold: u64) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = groups
        .iter()
        .map(|g| Recommendation::for_group(g, escalation_threshold))
        .collect();
    recommendations.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.category.cmp(&b.category))
    });
    recommendations
}
