// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands of
//! scheduled tasks, using `tokio::process::Command`, with their output
//! redirected to per-run log files.
//!
//! - [`task_runner`] runs one invocation and arbitrates stop/kill requests
//!   against normal completion.
//! - [`registry`] tracks the invocations running within a cycle.
//! - [`hooks`] runs before/after hooks.
//! - [`log_file`] names and opens per-run log files.
//! - [`backend`] provides the `Executor` trait and the production
//!   `ProcessExecutor`, which tests can replace with a fake.

pub mod backend;
pub mod hooks;
pub mod log_file;
pub mod registry;
pub mod task_runner;

pub use backend::{ExecutionContext, Executor, ProcessExecutor};
pub use log_file::{RunLog, log_file_name, open_run_log};
pub use registry::RunRegistry;
pub use task_runner::{ControlSignal, ProcessRunner, RunControl, RunOutcome, RunPhase};
