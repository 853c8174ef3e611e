use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Free-form metadata or statistics attached to a module result.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Semantic kind of an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    File,
    Directory,
    Data,
}

impl std::fmt::Display for IoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoType::File => write!(f, "file"),
            IoType::Directory => write!(f, "directory"),
            IoType::Data => write!(f, "data"),
        }
    }
}

/// One declared input or output of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub io_type: IoType,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl IoSpec {
    pub fn new(name: &str, description: &str, io_type: IoType, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            io_type,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// True when this output can feed `input`: same type, shared pattern.
    pub fn feeds(&self, input: &IoSpec) -> bool {
        self.io_type == input.io_type && self.patterns.iter().any(|p| input.patterns.contains(p))
    }
}

/// Inputs a module consumes and outputs it produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoContract {
    #[serde(default)]
    pub required_inputs: Vec<IoSpec>,
    #[serde(default)]
    pub optional_inputs: Vec<IoSpec>,
    #[serde(default)]
    pub produced_outputs: Vec<IoSpec>,
}

impl IoContract {
    /// Check the structural rules every registered contract must satisfy.
    pub fn check(&self) -> Result<(), String> {
        for input in self.required_inputs.iter().chain(&self.optional_inputs) {
            if input.name.trim().is_empty() {
                return Err("input with an empty name".to_string());
            }
        }
        for output in &self.produced_outputs {
            if output.name.trim().is_empty() {
                return Err("output with an empty name".to_string());
            }
            if output.patterns.is_empty() {
                return Err(format!("output '{}' declares no match patterns", output.name));
            }
            if output.patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(format!("output '{}' declares an empty pattern", output.name));
            }
        }
        Ok(())
    }

    /// Look up a required or optional input by name.
    pub fn input(&self, name: &str) -> Option<&IoSpec> {
        self.required_inputs
            .iter()
            .chain(&self.optional_inputs)
            .find(|i| i.name == name)
    }

    /// Patterns expected for the input called `name`, empty when undeclared.
    pub fn input_patterns(&self, name: &str) -> &[String] {
        self.input(name).map(|i| i.patterns.as_slice()).unwrap_or(&[])
    }
}

/// Result of a successful module execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
    /// Output name → produced path.
    pub outputs: BTreeMap<String, String>,
    pub metadata: Metadata,
    pub statistics: Metadata,
}

impl ModuleResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, name: &str, path: impl Into<String>) -> Self {
        self.outputs.insert(name.to_string(), path.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_statistic(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.statistics.insert(key.to_string(), value.into());
        self
    }
}

/// Per-call execution context handed to a module.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub run_id: String,
    pub step: String,
    pub output_dir: PathBuf,
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl ExecContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Match a produced path against a contract pattern.
///
/// `*.ext` style patterns match by suffix (ASCII case-insensitive); anything
/// else must equal the path or its final component.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        return path.len() >= suffix.len()
            && path.is_char_boundary(path.len() - suffix.len())
            && path[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix);
    }
    path == pattern
        || path
            .rsplit(['/', '\\'])
            .next()
            .is_some_and(|name| name == pattern)
}
