// src/engine/handle.rs

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::dag::TaskName;
use crate::errors::{Result, RunnerError};
use crate::exec::RunRegistry;

/// Cloneable stop/kill access to one running cycle.
///
/// Control-surface code keeps a clone while the driver awaits the
/// [`OrchestrationHandle`].
#[derive(Debug, Clone)]
pub struct CycleController {
    job_id: Arc<str>,
    registry: RunRegistry,
}

impl CycleController {
    pub(crate) fn new(job_id: Arc<str>, registry: RunRegistry) -> Self {
        Self { job_id, registry }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Interrupt every running process of the cycle and start no new ones.
    ///
    /// Returns [`RunnerError::NoRunningProcess`] when no process was busy;
    /// the cycle is cancelled either way.
    pub fn stop(&self) -> Result<()> {
        self.registry.stop_all()
    }

    /// Kill every running process of the cycle and start no new ones.
    pub fn kill(&self) -> Result<()> {
        self.registry.kill_all()
    }

    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled()
    }

    pub fn busy_tasks(&self) -> Vec<TaskName> {
        self.registry.busy_tasks()
    }
}

/// Awaitable, cancellable result of one workflow cycle.
#[derive(Debug)]
pub struct OrchestrationHandle {
    controller: CycleController,
    done_rx: oneshot::Receiver<Result<()>>,
}

impl OrchestrationHandle {
    pub(crate) fn new(controller: CycleController, done_rx: oneshot::Receiver<Result<()>>) -> Self {
        Self {
            controller,
            done_rx,
        }
    }

    pub fn job_id(&self) -> &str {
        self.controller.job_id()
    }

    pub fn controller(&self) -> CycleController {
        self.controller.clone()
    }

    pub fn stop(&self) -> Result<()> {
        self.controller.stop()
    }

    pub fn kill(&self) -> Result<()> {
        self.controller.kill()
    }

    /// Wait for the cycle to finish. Resolves exactly once, with the first
    /// error that aborted the cycle if any.
    pub async fn wait(self) -> Result<()> {
        match self.done_rx.await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::Other(anyhow::anyhow!(
                "workflow cycle ended without reporting a result"
            ))),
        }
    }
}
