use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use workflow_runner::dag::TaskNode;
use workflow_runner::errors::{Result, RunnerError};
use workflow_runner::exec::{ExecutionContext, Executor};

/// A fake executor that:
/// - records which tasks were "run", in start order
/// - fails the tasks it was told to fail
/// - optionally sleeps per task, to observe concurrency
#[derive(Default)]
pub struct FakeExecutor {
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }

    pub fn with_delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    /// Tasks executed so far, in start order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Highest number of tasks that were executing at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Executor for FakeExecutor {
    fn execute(
        &self,
        node: Arc<TaskNode>,
        ctx: ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if ctx.registry.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            self.executed.lock().unwrap().push(node.name.clone());
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now_running, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(&node.name) {
                tokio::time::sleep(*delay).await;
            }

            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&node.name) {
                return Err(RunnerError::CommandFailed {
                    task: node.name.clone(),
                    reason: "exit status 1".to_string(),
                });
            }
            Ok(())
        })
    }
}
