// src/control/driver.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::control::ControlContext;
use crate::dag::{DependencyGraph, TaskName};
use crate::engine::{Orchestrator, next_cycle_delay};
use crate::errors::Result;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    /// Run a single cycle and return its result.
    pub once: bool,
    /// Wait between cycles when no source tracks a refresh interval.
    pub idle_fallback: Duration,
    /// Minimum wait after a failed cycle.
    pub retry_delay: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            once: false,
            idle_fallback: Duration::from_secs(24 * 60 * 60),
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Runs cycles back to back, idling in between, until shutdown.
#[derive(Debug)]
pub struct Driver {
    orchestrator: Arc<Orchestrator>,
    ctx: Arc<ControlContext>,
    root: TaskName,
    options: DriverOptions,
}

impl Driver {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        ctx: Arc<ControlContext>,
        root: impl Into<TaskName>,
        options: DriverOptions,
    ) -> Self {
        Self {
            orchestrator,
            ctx,
            root: root.into(),
            options,
        }
    }

    /// Drive cycles until shutdown (or after one cycle with `once`).
    /// Returns the number of cycles started.
    ///
    /// A failed cycle is logged and the loop goes on; only in `once` mode,
    /// and only when no shutdown was requested, is its error returned.
    pub async fn run(&self) -> Result<usize> {
        let sources = self.tracked_sources()?;
        let mut cycles = 0usize;

        loop {
            if self.ctx.is_shutdown_requested() {
                info!("shutdown requested; not starting another workflow");
                return Ok(cycles);
            }

            let handle = self.orchestrator.start(&self.root);
            cycles += 1;
            self.ctx.set_current(handle.controller());
            let job_id = handle.job_id().to_string();
            let result = handle.wait().await;
            self.ctx.clear_current();

            let shutdown = self.ctx.is_shutdown_requested();
            let failed = result.is_err();
            match result {
                Ok(()) => {}
                Err(e) if self.options.once && !shutdown => return Err(e),
                Err(e) => error!(job_id = %job_id, error = %e, "workflow running failed"),
            }

            if self.options.once || shutdown {
                return Ok(cycles);
            }

            let mut wait = next_cycle_delay(
                sources.iter().map(|(name, interval)| (name.as_str(), *interval)),
                &**self.orchestrator.history(),
                Utc::now(),
                self.options.idle_fallback,
            );
            if failed {
                wait = wait.max(self.options.retry_delay);
            }
            info!(wait_secs = wait.as_secs(), "waiting before the next workflow");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.ctx.wait_for_shutdown() => {
                    info!("shutdown requested while idle");
                    return Ok(cycles);
                }
            }
        }
    }

    /// Sources the root depends on. Sources outside the root's closure never
    /// run, so counting them would keep the idle interval at zero.
    fn tracked_sources(&self) -> Result<Vec<(TaskName, Duration)>> {
        let workflow = self.orchestrator.workflow();
        let graph = DependencyGraph::from_root(workflow, &self.root)?;
        Ok(workflow
            .refresh_sources()
            .into_iter()
            .filter(|(name, _)| graph.contains(name))
            .map(|(name, interval)| (name.to_string(), interval))
            .collect())
    }
}
