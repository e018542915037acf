// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Variants are grouped the way failures surface to the caller of
//! [`OrchestrationHandle::wait`](crate::engine::OrchestrationHandle::wait):
//! planning, setup, execution and control errors, plus the configuration
//! and IO errors raised before any cycle starts.

use std::path::PathBuf;

use thiserror::Error;

use crate::dag::TaskName;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskName),

    // Planning errors.
    #[error("circular dependency detected among tasks: {}", .0.join(", "))]
    CircularDependency(Vec<TaskName>),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskName, dependency: TaskName },

    // Setup errors.
    #[error("failed to prepare log file {path:?} for task '{task}': {source}")]
    LogSetup {
        task: TaskName,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Execution errors.
    #[error("failed to spawn command for task '{task}': {source}")]
    Spawn {
        task: TaskName,
        #[source]
        source: std::io::Error,
    },

    #[error("command of task '{task}' failed: {reason}")]
    CommandFailed { task: TaskName, reason: String },

    #[error("{stage} hook of task '{task}' failed: {reason}")]
    HookFailed {
        task: TaskName,
        stage: &'static str,
        reason: String,
    },

    #[error("task '{0}' was interrupted")]
    Interrupted(TaskName),

    #[error("task '{0}' was killed")]
    Killed(TaskName),

    #[error("workflow cycle was cancelled")]
    Cancelled,

    // Control errors.
    #[error("no running process")]
    NoRunningProcess,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("history store error: {0}")]
    History(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunnerError {
    /// Control errors never affect scheduling; callers usually just log them.
    pub fn is_control_error(&self) -> bool {
        matches!(self, RunnerError::NoRunningProcess)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunnerError>;
