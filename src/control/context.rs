// src/control/context.rs

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::CycleController;
use crate::errors::{Result, RunnerError};

/// State shared by the driver, the signal task and the RPC server: the
/// controller of the cycle in flight (if any) and whether shutdown was
/// requested.
#[derive(Debug)]
pub struct ControlContext {
    current: Mutex<Option<CycleController>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for ControlContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlContext {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            current: Mutex::new(None),
            shutdown_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CycleController>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register the controller of the cycle that just started. A shutdown
    /// that raced with the start is applied to it immediately.
    pub fn set_current(&self, controller: CycleController) {
        let mut current = self.lock();
        if self.is_shutdown_requested() {
            match controller.stop() {
                Ok(()) => info!(job_id = controller.job_id(), "stopped cycle started during shutdown"),
                Err(e) if e.is_control_error() => {
                    debug!(job_id = controller.job_id(), "cycle cancelled before any process started")
                }
                Err(e) => warn!(job_id = controller.job_id(), error = %e, "failed to stop cycle"),
            }
        }
        *current = Some(controller);
    }

    pub fn clear_current(&self) {
        self.lock().take();
    }

    pub fn current(&self) -> Option<CycleController> {
        self.lock().clone()
    }

    /// Stop the cycle in flight without asking the driver to exit.
    pub fn stop_current(&self) -> Result<()> {
        match self.lock().as_ref() {
            Some(controller) => controller.stop(),
            None => Err(RunnerError::NoRunningProcess),
        }
    }

    /// Ask the driver to exit and stop the cycle in flight, if any.
    pub fn request_shutdown(&self, source: &str) {
        info!(source, "shutdown requested");
        self.shutdown_tx.send_replace(true);

        match self.stop_current() {
            Ok(()) => info!(source, "stopped the running workflow"),
            Err(e) if e.is_control_error() => debug!(source, "no process was running"),
            Err(e) => warn!(source, error = %e, "failed to stop the running workflow"),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}
