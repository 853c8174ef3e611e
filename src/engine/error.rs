use thiserror::Error;

use crate::engine::params::ParamError;

/// Failures raised while building or ordering the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },

    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: String, to: String },

    #[error("cycle detected in workflow graph, unscheduled nodes: {0:?}")]
    Unschedulable(Vec<String>),
}

/// Failures raised by the module registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("module name must not be empty")]
    EmptyName,

    #[error("module '{module}' declares an invalid IO contract: {reason}")]
    InvalidContract { module: String, reason: String },

    #[error("module '{0}' is already registered")]
    Duplicate(String),

    #[error("module '{0}' not found")]
    NotFound(String),
}

/// Errors surfaced by the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid workflow spec: {0}")]
    Config(String),

    #[error("step '{step}' uses unknown module '{module}'")]
    UnknownModule { step: String, module: String },

    #[error("step '{0}' not found in workflow")]
    StepNotFound(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("step '{step}' ({module}) rejected its parameters: {source}")]
    Validation {
        step: String,
        module: String,
        #[source]
        source: ParamError,
    },

    #[error("step '{step}' ({module}) failed: {message}")]
    StepFailed {
        step: String,
        module: String,
        message: String,
    },

    #[error("step '{step}' ({module}) timed out after {timeout_s}s")]
    TimedOut {
        step: String,
        module: String,
        timeout_s: u64,
    },

    #[error("workflow cancelled during step '{step}' ({module})")]
    Cancelled { step: String, module: String },

    #[error("no active run")]
    NoActiveRun,

    #[error("state persistence failed: {0:#}")]
    Persistence(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Step name carried by execution-time errors.
    pub fn step(&self) -> Option<&str> {
        match self {
            WorkflowError::Validation { step, .. }
            | WorkflowError::StepFailed { step, .. }
            | WorkflowError::TimedOut { step, .. }
            | WorkflowError::Cancelled { step, .. } => Some(step),
            _ => None,
        }
    }
}
