//! Text matching patterns used to classify step results

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Pattern for matching step types and messages (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum MatchPattern {
    /// Case-insensitive substring match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl MatchPattern {
    /// Compile a pattern spec; an invalid regex falls back to a substring match
    pub fn compile(spec: &PatternSpec) -> Self {
        match spec {
            PatternSpec::Simple(text) => MatchPattern::Simple(text.to_lowercase()),
            PatternSpec::Regex { regex } => {
                match RegexBuilder::new(regex).case_insensitive(true).build() {
                    Ok(compiled) => MatchPattern::Regex(compiled),
                    Err(_) => MatchPattern::Simple(regex.to_lowercase()),
                }
            }
        }
    }

    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            MatchPattern::Simple(pattern) => text.to_lowercase().contains(pattern.as_str()),
            MatchPattern::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Serializable pattern as written in settings
///
/// A bare string is a substring pattern; `{ regex: "..." }` is a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    Simple(String),
    Regex { regex: String },
}

impl From<&str> for PatternSpec {
    fn from(s: &str) -> Self {
        PatternSpec::Simple(s.to_string())
    }
}
