use std::collections::HashSet;
use std::fmt;

use crate::error::{PipelineError, Result};

pub const MIN_STAGES: usize = 2;
pub const MAX_STAGES: usize = 10;

pub const DEFAULT_STAGES: [&str; 6] = [
    "Applications",
    "Phone Screen",
    "Technical Interview",
    "Onsite Interview",
    "Offers",
    "Hires",
];

/// Ordered funnel stages, earliest first. The last stage is the hire stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageList {
    names: Vec<String>,
}

impl StageList {
    /// Builds a stage list from user-supplied names.
    ///
    /// Names are trimmed. Empty names, case-sensitive duplicates, and counts
    /// outside `MIN_STAGES..=MAX_STAGES` are rejected.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .collect();

        if names.len() < MIN_STAGES {
            return Err(PipelineError::configuration(format!(
                "at least {MIN_STAGES} stages are required, got {}",
                names.len()
            )));
        }
        if names.len() > MAX_STAGES {
            return Err(PipelineError::configuration(format!(
                "at most {MAX_STAGES} stages are supported, got {}",
                names.len()
            )));
        }

        let mut seen = HashSet::new();
        for (index, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(PipelineError::configuration(format!(
                    "stage {} has an empty name",
                    index + 1
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::configuration(format!(
                    "duplicate stage name '{name}'"
                )));
            }
        }

        Ok(Self { names })
    }

    /// Builds a stage list from an explicit count and the names for it.
    pub fn with_count<I, S>(count: usize, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        if names.len() != count {
            return Err(PipelineError::configuration(format!(
                "expected {count} stage names, got {}",
                names.len()
            )));
        }
        Self::new(names)
    }

    /// Returns a list with `count` stages: truncated, or padded with
    /// `Stage {n}` placeholders at the new positions.
    pub fn resize(&self, count: usize) -> Result<Self> {
        let names = (0..count).map(|index| {
            self.names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("Stage {}", index + 1))
        });
        Self::new(names)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn first(&self) -> &str {
        &self.names[0]
    }

    pub fn last(&self) -> &str {
        &self.names[self.names.len() - 1]
    }

    /// Consecutive `(from, to)` stage pairs in funnel order.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.names
            .windows(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }
}

impl Default for StageList {
    fn default() -> Self {
        Self {
            names: DEFAULT_STAGES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl fmt::Display for StageList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join(" -> "))
    }
}
