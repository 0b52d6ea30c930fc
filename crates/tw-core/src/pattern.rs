//! Glob-style action name patterns.
//!
//! A pattern is matched against the whole name; `*` matches any run of
//! characters (including `.`), every other character is literal.

use crate::error::{CoreError, CoreResult};
use crate::target::Target;
use regex::Regex;

/// A compiled, anchored name pattern
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: Regex,
}

impl NamePattern {
    /// Compile a pattern such as `staging.*` or `*_daily`.
    pub fn parse(pattern: &str) -> CoreResult<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern must not be empty".to_string(),
            });
        }

        let body = regex::escape(pattern).replace(r"\*", ".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { regex })
    }

    /// Compile a list of patterns, failing on the first invalid one.
    pub fn parse_all<S: AsRef<str>>(patterns: &[S]) -> CoreResult<Vec<Self>> {
        patterns.iter().map(|p| Self::parse(p.as_ref())).collect()
    }

    /// Whether the pattern matches `value` in full.
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Whether the pattern matches the target's readable name or its bare name.
    pub fn matches_target(&self, target: &Target) -> bool {
        self.matches(&target.readable_name()) || self.matches(&target.name)
    }
}

#[cfg(test)]
#[path = "pattern_test.rs"]
mod tests;
