// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The orchestrator hands each scheduled task to an [`Executor`] instead of
//! spawning processes itself. Production code uses [`ProcessExecutor`];
//! tests can provide an implementation that records which tasks ran and
//! fails on demand without touching the OS.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::dag::{HookContext, HookStage, TaskNode};
use crate::errors::{Result, RunnerError};
use crate::exec::hooks::run_hook;
use crate::exec::log_file::{DEFAULT_OUTPUT_DIR, open_run_log};
use crate::exec::registry::RunRegistry;
use crate::exec::task_runner::{DEFAULT_STOP_GRACE, ProcessRunner};

/// Per-cycle information an executor needs besides the task itself.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub job_id: Arc<str>,
    /// Runs must be registered here so the cycle's handle can stop them.
    pub registry: RunRegistry,
}

/// Trait abstracting how a scheduled task is executed.
pub trait Executor: Send + Sync {
    /// Execute `node` to completion: before hook, command, after hook.
    fn execute(
        &self,
        node: Arc<TaskNode>,
        ctx: ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor: runs commands as child processes with output redirected
/// to per-run log files.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    output_dir: PathBuf,
    stop_grace: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl ProcessExecutor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    async fn execute_node(&self, node: Arc<TaskNode>, ctx: ExecutionContext) -> Result<()> {
        if ctx.registry.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        let log = open_run_log(&self.output_dir, &node)?;

        let before = HookContext {
            task: &node.name,
            job_id: &ctx.job_id,
            stage: HookStage::Before,
        };
        run_hook(&node.before, before, &log.file).await?;

        let runner = ProcessRunner::new(node.name.clone(), node.command.clone())
            .with_stop_grace(self.stop_grace);
        ctx.registry.register(runner.control())?;
        let outcome = runner.run(&log.file).await;
        ctx.registry.unregister(&node.name);
        outcome?.into_result(&node.name)?;

        let after = HookContext {
            task: &node.name,
            job_id: &ctx.job_id,
            stage: HookStage::After,
        };
        run_hook(&node.after, after, &log.file).await?;

        debug!(task = %node.name, log = %log.path.display(), "closing run log");
        drop(log);
        Ok(())
    }
}

impl Executor for ProcessExecutor {
    fn execute(
        &self,
        node: Arc<TaskNode>,
        ctx: ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.execute_node(node, ctx))
    }
}
