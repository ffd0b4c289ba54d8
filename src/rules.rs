//! Skip rules decide whether a job's steps can be bypassed because its
//! outputs are already newer than its inputs.
//!
//! A missing target means "not built yet" and is never an error. A missing
//! source, or a source glob that matches nothing, points at a misconfigured
//! rule and is reported as one.

use std::{fmt, path::PathBuf};

use serde::Deserialize;

use crate::{
    error::Result,
    util::{expand_glob, modified_time, newest_modified_time},
};

pub trait Rule: Send + Sync {
    /// Human readable description used in diagnostics.
    fn name(&self) -> String;

    fn can_skip(&self) -> Result<bool>;
}

impl fmt::Debug for dyn Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Skippable when `target` exists and is at least as new as `source`.
#[derive(Debug, Clone)]
pub struct FileRule {
    source: PathBuf,
    target: PathBuf,
}

impl FileRule {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl Rule for FileRule {
    fn name(&self) -> String {
        format!(
            "FileRule(source={}, target={})",
            self.source.display(),
            self.target.display()
        )
    }

    fn can_skip(&self) -> Result<bool> {
        if !self.target.exists() {
            return Ok(false);
        }

        let source_time = modified_time(&self.source)?;
        let target_time = modified_time(&self.target)?;

        Ok(target_time >= source_time)
    }
}

/// Skippable when `target` exists and is at least as new as the newest file
/// matched by the `source` glob.
#[derive(Debug, Clone)]
pub struct SourceGlobRule {
    pattern: String,
    target: PathBuf,
}

impl SourceGlobRule {
    pub fn new(pattern: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
        }
    }
}

impl Rule for SourceGlobRule {
    fn name(&self) -> String {
        format!(
            "SourceGlobRule(source={}, target={})",
            self.pattern,
            self.target.display()
        )
    }

    fn can_skip(&self) -> Result<bool> {
        // Expanded before the target check so an empty glob always surfaces.
        let sources = expand_glob(&self.pattern)?;

        if !self.target.exists() {
            return Ok(false);
        }

        let newest_source = match newest_modified_time(&sources)? {
            Some(time) => time,
            None => return Ok(false),
        };
        let target_time = modified_time(&self.target)?;

        Ok(target_time >= newest_source)
    }
}

/// Rule declaration as written in a job file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleConfig {
    File { source: String, target: String },
    Glob { source: String, target: String },
}

impl RuleConfig {
    pub fn into_rule(self) -> Box<dyn Rule> {
        match self {
            RuleConfig::File { source, target } => Box::new(FileRule::new(source, target)),
            RuleConfig::Glob { source, target } => Box::new(SourceGlobRule::new(source, target)),
        }
    }

    pub fn map_paths(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            RuleConfig::File { source, target } => RuleConfig::File {
                source: f(&source),
                target: f(&target),
            },
            RuleConfig::Glob { source, target } => RuleConfig::Glob {
                source: f(&source),
                target: f(&target),
            },
        }
    }
}

/// A rule set permits skipping only when it is non-empty and every rule
/// agrees. All rules are evaluated before deciding; the first error wins.
pub fn all_can_skip(rules: &[Box<dyn Rule>]) -> Result<bool> {
    if rules.is_empty() {
        return Ok(false);
    }

    let mut skip = true;
    for rule in rules {
        if !rule.can_skip()? {
            skip = false;
        }
    }

    Ok(skip)
}
