// src/exec/registry.rs

//! Processes currently running within one workflow cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::dag::TaskName;
use crate::errors::{Result, RunnerError};
use crate::exec::task_runner::{ControlSignal, RunControl};

#[derive(Debug, Default)]
struct Inner {
    /// At most one run per task name.
    active: HashMap<TaskName, RunControl>,
    /// First cancellation request received for the cycle, if any.
    cancelled: Option<ControlSignal>,
}

/// Shared between the orchestrator, the executor and every clone of the
/// cycle's controller, so a stop/kill reaches whichever processes are
/// running at that moment.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a run so it can be signalled. Fails with
    /// [`RunnerError::Cancelled`] once the cycle has been stopped, so no new
    /// process is started afterwards.
    pub fn register(&self, control: RunControl) -> Result<()> {
        let mut inner = self.lock();
        if inner.cancelled.is_some() {
            return Err(RunnerError::Cancelled);
        }
        inner.active.insert(control.task().to_string(), control);
        Ok(())
    }

    pub fn unregister(&self, task: &str) {
        self.lock().active.remove(task);
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled.is_some()
    }

    /// Names of tasks whose process is currently busy.
    pub fn busy_tasks(&self) -> Vec<TaskName> {
        let mut names: Vec<TaskName> = self
            .lock()
            .active
            .values()
            .filter(|c| c.is_busy())
            .map(|c| c.task().to_string())
            .collect();
        names.sort();
        names
    }

    /// Mark the cycle cancelled and interrupt every busy process.
    pub fn stop_all(&self) -> Result<()> {
        self.signal_all(ControlSignal::Stop)
    }

    /// Mark the cycle cancelled and kill every busy process.
    pub fn kill_all(&self) -> Result<()> {
        self.signal_all(ControlSignal::Kill)
    }

    /// Interrupt the round's other runs without cancelling the cycle; used
    /// to wind down after one of its tasks failed. Runs that have not
    /// spawned yet will not start.
    pub(crate) fn interrupt_busy(&self) {
        let inner = self.lock();
        for control in inner.active.values() {
            match control.cancel(ControlSignal::Stop) {
                Ok(()) => info!(task = %control.task(), "interrupted after round failure"),
                Err(RunnerError::NoRunningProcess) => {}
                Err(e) => warn!(task = %control.task(), error = %e, "failed to interrupt task"),
            }
        }
    }

    fn signal_all(&self, signal: ControlSignal) -> Result<()> {
        let mut inner = self.lock();

        if signal == ControlSignal::Kill || inner.cancelled.is_none() {
            inner.cancelled = Some(signal);
        }

        let mut delivered = 0usize;
        for control in inner.active.values() {
            match control.cancel(signal) {
                Ok(()) => {
                    info!(task = %control.task(), ?signal, "signal delivered");
                    delivered += 1;
                }
                Err(RunnerError::NoRunningProcess) => {
                    debug!(task = %control.task(), ?signal, "task not busy; skipping");
                }
                Err(e) => {
                    warn!(task = %control.task(), ?signal, error = %e, "failed to signal task");
                }
            }
        }

        if delivered == 0 {
            Err(RunnerError::NoRunningProcess)
        } else {
            Ok(())
        }
    }
}
