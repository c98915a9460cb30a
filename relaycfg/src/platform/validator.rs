//! Structural plausibility check for retrieved configuration text.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Output shorter than this (trimmed) is never a configuration.
pub const MIN_CONFIG_LEN: usize = 50;

/// Result of validating one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Validation {
    Accepted { matches: usize },
    TooShort { len: usize },
    InsufficientStructure { matches: usize, required: usize },
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Requires at least `min_matches` of a set of vendor patterns to occur.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    patterns: Vec<Regex>,
    min_matches: usize,
    min_len: usize,
}

impl ContentValidator {
    /// Compile case-insensitive, multi-line patterns. Two matches and
    /// [`MIN_CONFIG_LEN`] characters are required by default.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            min_matches: 2,
            min_len: MIN_CONFIG_LEN,
        })
    }

    /// Set how many distinct patterns must match.
    pub fn with_min_matches(mut self, min_matches: usize) -> Self {
        self.min_matches = min_matches;
        self
    }

    /// Set the minimum trimmed length.
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    pub fn validate(&self, text: &str) -> Validation {
        let len = text.trim().chars().count();
        if len < self.min_len {
            return Validation::TooShort { len };
        }
        let matches = self.patterns.iter().filter(|p| p.is_match(text)).count();
        if matches >= self.min_matches {
            Validation::Accepted { matches }
        } else {
            Validation::InsufficientStructure {
                matches,
                required: self.min_matches,
            }
        }
    }

    pub fn is_valid(&self, text: &str) -> bool {
        self.validate(text).is_accepted()
    }
}
