// SPDX-License-Identifier: MIT

//! Typed error handling for stepflow-rs
//!
//! Each concern gets its own `thiserror` enum; `StepflowError` wraps them all
//! for the CLI and HTTP surfaces.

use thiserror::Error;

/// Failure type returned by step functions
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for stepflow-rs
#[derive(Debug, Error)]
pub enum StepflowError {
    /// Graph construction or validation errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors raised while running a workflow
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Checkpoint persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// State record and schema errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Workflow definition errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Configuration errors (invalid env vars, bad flags)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Graph construction and validation errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Step '{0}' is already registered")]
    DuplicateStep(String),

    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error("Steps not reachable from start: {0:?}")]
    UnreachableStep(Vec<String>),

    #[error("Cycle detected: {0:?}")]
    Cycle(Vec<String>),

    #[error("Invalid edge {from} -> {to}: {reason}")]
    InvalidEdge {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Graph has no entry edge from start")]
    MissingEntry,

    #[error("Step '{step}' has {count} successors, but branching is disabled")]
    Branching { step: String, count: usize },

    #[error("Step '{0}' has no outbound edge")]
    DeadEnd(String),

    #[error("'{0}' is a reserved name")]
    ReservedName(String),
}

/// Errors raised by the execution engine during a run
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A step function failed. No checkpoint was written for it.
    #[error("Step '{step}' failed in session '{session_id}' (last checkpoint: {last_sequence:?}): {source}")]
    StepExecution {
        session_id: String,
        step: String,
        last_sequence: Option<u64>,
        #[source]
        source: StepError,
    },

    /// The run exceeded the configured step ceiling
    #[error("Session '{session_id}' exceeded the step limit of {limit}")]
    StepLimitExceeded { session_id: String, limit: usize },

    /// The latest checkpoint names a step the graph does not contain
    #[error("Cannot resume session '{session_id}': step '{step}' is not in the graph")]
    UnknownResumePoint { session_id: String, step: String },

    /// A manual update was attributed to an unregistered step
    #[error("Cannot attribute update to unknown step '{0}'")]
    UnknownStep(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Checkpoint store errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying storage rejected a write
    #[error("Failed to write checkpoint for session '{session_id}': {message}")]
    StoreWrite { session_id: String, message: String },

    /// Underlying storage could not be read
    #[error("Failed to read checkpoints for session '{session_id}': {message}")]
    StoreRead { session_id: String, message: String },

    /// Manual update requested for a session without checkpoints
    #[error("Session '{0}' has no checkpoints")]
    SessionNotFound(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// State record and schema errors
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("Field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("State must be a JSON object, got {0}")]
    NotAnObject(String),
}

/// Workflow definition and binding errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A YAML step has no built-in kind and nothing registered under its name
    #[error("No step registered for '{0}'")]
    UnboundStep(String),

    /// Unknown built-in step kind
    #[error("Unknown step kind: {0}")]
    UnknownStepKind(String),

    /// Built-in step parameters are missing or malformed
    #[error("Invalid parameters for step '{step}': {message}")]
    InvalidStepParams { step: String, message: String },

    /// File not found when loading workflow
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

impl StepflowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl CheckpointError {
    pub fn write(session_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::StoreWrite {
            session_id: session_id.into(),
            message: err.to_string(),
        }
    }

    pub fn read(session_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::StoreRead {
            session_id: session_id.into(),
            message: err.to_string(),
        }
    }
}

impl WorkflowError {
    pub fn invalid_params(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidStepParams {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl ExecutionError {
    /// Name of the failing step, if this error came from a step function
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StepExecution { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_execution_error_names_step_and_session() {
        let err = ExecutionError::StepExecution {
            session_id: "s1".to_string(),
            step: "process".to_string(),
            last_sequence: Some(1),
            source: "boom".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("process"));
        assert!(msg.contains("s1"));
        assert!(msg.contains("boom"));
        assert_eq!(err.failed_step(), Some("process"));
    }

    #[test]
    fn test_step_execution_keeps_source() {
        use std::error::Error;

        let err = ExecutionError::StepExecution {
            session_id: "s1".to_string(),
            step: "load".to_string(),
            last_sequence: None,
            source: "disk full".into(),
        };
        assert_eq!(err.source().unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_graph_error_converts_to_top_level() {
        let err: StepflowError = GraphError::DuplicateStep("load".to_string()).into();
        assert!(err.to_string().contains("load"));
        assert!(matches!(err, StepflowError::Graph(_)));
    }

    #[test]
    fn test_checkpoint_error_helpers() {
        let err = CheckpointError::write("s1", "permission denied");
        assert!(err.to_string().contains("permission denied"));

        let err = CheckpointError::read("s2", "corrupt line");
        assert!(err.to_string().contains("s2"));
    }

    #[test]
    fn test_config_error() {
        let err = StepflowError::config("STEPFLOW_MAX_STEPS must be a number");
        assert!(err.to_string().contains("STEPFLOW_MAX_STEPS"));
    }
}
