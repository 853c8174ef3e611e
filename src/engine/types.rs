use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::WorkflowError;
use crate::engine::params::Params;
use crate::modules::Metadata;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Complete | WorkflowStatus::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Complete => write!(f, "complete"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status of an individual node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Complete => write!(f, "complete"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Kind of entry in a run's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Started,
    Completed,
    Failed,
}

/// One append-only history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub event_type: EventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub data: Metadata,
}

impl WorkflowEvent {
    pub fn new(node_id: &str, event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            node_id: node_id.to_string(),
            event_type,
            message: message.into(),
            data: Metadata::new(),
        }
    }

    pub fn with_data(mut self, data: Metadata) -> Self {
        self.data = data;
        self
    }
}

/// Definition of a single step in a workflow spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub module: String,
    #[serde(default, alias = "params")]
    pub parameters: Params,
}

impl Step {
    pub fn new(name: &str, module: &str) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            parameters: Params::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<crate::engine::params::ParamValue>) -> Self {
        self.parameters.insert(key, value);
        self
    }
}

fn default_output() -> String {
    "./output".to_string()
}

/// Complete workflow definition (parsed from YAML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Global input handed to the first step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Root directory under which each run gets its own output directory.
    #[serde(default = "default_output")]
    pub output: String,
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Load a workflow spec from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow spec: {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to load workflow spec: {}", path.display()))
    }

    /// Parse and validate a workflow spec from a YAML string.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let workflow: Workflow =
            serde_yml::from_str(source).context("Failed to parse workflow YAML")?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Structural checks done before anything executes.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Config("workflow name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::Config(format!(
                "workflow '{}' declares no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(WorkflowError::Config(format!("step #{} has no name", index + 1)));
            }
            if step.module.trim().is_empty() {
                return Err(WorkflowError::Config(format!(
                    "step '{}' has no module",
                    step.name
                )));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(WorkflowError::Config(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }
        Ok(())
    }

    /// Index of the step called `name`.
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}
