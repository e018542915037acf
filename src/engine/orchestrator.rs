// src/engine/orchestrator.rs

//! Drives one workflow cycle: plan, then run rounds in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dag::{BuildPlan, Round, TaskName, Workflow, plan};
use crate::engine::handle::{CycleController, OrchestrationHandle};
use crate::engine::history::{HistoryAction, HistoryEntry, HistoryStore};
use crate::errors::{Result, RunnerError};
use crate::exec::{ExecutionContext, Executor, RunRegistry};

#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorOptions {
    /// Whether tasks without a freshness predicate need to run.
    pub needs_update_default: bool,
}

/// Starts workflow cycles against an immutable [`Workflow`].
pub struct Orchestrator {
    workflow: Arc<Workflow>,
    executor: Arc<dyn Executor>,
    history: Arc<dyn HistoryStore>,
    options: OrchestratorOptions,
    cycle_counter: AtomicU64,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tasks", &self.workflow.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        workflow: Arc<Workflow>,
        executor: Arc<dyn Executor>,
        history: Arc<dyn HistoryStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            workflow,
            executor,
            history,
            options,
            cycle_counter: AtomicU64::new(0),
        }
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Compute the build sequence for `root` without running anything.
    pub fn plan(&self, root: &str) -> Result<BuildPlan> {
        plan(&self.workflow, root, self.options.needs_update_default)
    }

    /// Start a cycle rooted at `root` on a background task.
    ///
    /// Must be called from within a Tokio runtime. Planning errors surface
    /// through [`OrchestrationHandle::wait`] before any process runs.
    pub fn start(&self, root: &str) -> OrchestrationHandle {
        let n = self.cycle_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let job_id: Arc<str> = format!("job-{}-{n}", Local::now().format("%Y%m%d%H%M%S")).into();

        let registry = RunRegistry::new();
        let controller = CycleController::new(Arc::clone(&job_id), registry.clone());
        let (done_tx, done_rx) = oneshot::channel();

        let cycle = Cycle {
            workflow: Arc::clone(&self.workflow),
            executor: Arc::clone(&self.executor),
            history: Arc::clone(&self.history),
            registry,
            job_id,
            root: root.to_string(),
            needs_update_default: self.options.needs_update_default,
        };

        tokio::spawn(async move {
            let result = cycle.run().await;
            if done_tx.send(result).is_err() {
                debug!("orchestration handle dropped before the cycle finished");
            }
        });

        OrchestrationHandle::new(controller, done_rx)
    }
}

/// State of one running cycle.
struct Cycle {
    workflow: Arc<Workflow>,
    executor: Arc<dyn Executor>,
    history: Arc<dyn HistoryStore>,
    registry: RunRegistry,
    job_id: Arc<str>,
    root: TaskName,
    needs_update_default: bool,
}

impl Cycle {
    async fn run(self) -> Result<()> {
        let result = self.run_inner().await;
        match &result {
            Ok(()) => info!(job_id = %self.job_id, root = %self.root, "workflow finished"),
            Err(e) => error!(job_id = %self.job_id, root = %self.root, error = %e, "workflow failed"),
        }
        result
    }

    async fn run_inner(&self) -> Result<()> {
        // Freshness predicates may block on IO.
        let workflow = Arc::clone(&self.workflow);
        let root = self.root.clone();
        let default = self.needs_update_default;
        let build_plan = tokio::task::spawn_blocking(move || plan(&workflow, &root, default))
            .await
            .map_err(|e| RunnerError::Other(anyhow::anyhow!("planning task failed: {e}")))??;

        info!(job_id = %self.job_id, root = %self.root, "starting workflow");
        build_plan.log(&self.root);

        for (idx, round) in build_plan.rounds().iter().enumerate() {
            if self.registry.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }
            self.run_round(idx, round).await?;
        }

        self.mark_grouping_tasks_updated(&build_plan);
        Ok(())
    }

    /// Run every task of a round concurrently. The first failure interrupts
    /// the rest of the round and is returned once all of them have settled.
    async fn run_round(&self, idx: usize, round: &Round) -> Result<()> {
        let mut set: JoinSet<(TaskName, Result<()>)> = JoinSet::new();

        for name in round {
            let node = self
                .workflow
                .get(name)
                .cloned()
                .ok_or_else(|| RunnerError::TaskNotFound(name.clone()))?;

            if node.is_grouping() {
                info!(round = idx, task = %name, "skip (nothing to execute)");
                continue;
            }

            let executor = Arc::clone(&self.executor);
            let history = Arc::clone(&self.history);
            let ctx = ExecutionContext {
                job_id: Arc::clone(&self.job_id),
                registry: self.registry.clone(),
            };

            set.spawn(async move {
                let name = node.name.clone();
                record(&*history, HistoryEntry::now(&ctx.job_id, &name, HistoryAction::Start));
                let result = executor.execute(node, ctx.clone()).await;
                let entry = match &result {
                    Ok(()) => HistoryEntry::now(&ctx.job_id, &name, HistoryAction::End),
                    Err(e) => HistoryEntry::now(&ctx.job_id, &name, HistoryAction::Error)
                        .with_payload(e.to_string()),
                };
                record(&*history, entry);
                (name, result)
            });
        }

        let mut first_error: Option<RunnerError> = None;

        while let Some(joined) = set.join_next().await {
            let (name, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    let err = RunnerError::Other(anyhow::anyhow!("task runner panicked: {e}"));
                    if first_error.is_none() {
                        self.registry.interrupt_busy();
                        first_error = Some(err);
                    }
                    continue;
                }
            };

            match result {
                Ok(()) => debug!(round = idx, task = %name, "task finished"),
                Err(e) => {
                    error!(round = idx, task = %name, error = %e, "failed to run task");
                    if first_error.is_none() {
                        self.registry.interrupt_busy();
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Pure grouping tasks (typically sources) have no run of their own, so
    /// a successful cycle is what refreshes them.
    fn mark_grouping_tasks_updated(&self, plan: &BuildPlan) {
        for name in plan.rounds().iter().flatten() {
            if self.workflow.get(name).is_some_and(|n| n.is_grouping()) {
                record(
                    &*self.history,
                    HistoryEntry::now(&self.job_id, name, HistoryAction::End),
                );
            }
        }
    }
}

fn record(history: &dyn HistoryStore, entry: HistoryEntry) {
    if let Err(e) = history.record(entry) {
        warn!(error = %e, "failed to record job history");
    }
}
