// src/config/workflow.rs

//! Turn a validated [`ConfigFile`] into a [`Workflow`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{ConfigFile, TaskConfig};
use crate::dag::{Freshness, Hook, TaskName, TaskNode, Workflow};
use crate::engine::{HistoryStore, interval_freshness};
use crate::errors::{Result, RunnerError};

/// Name of the grouping root added over several sinks.
pub const GROUP_ROOT: &str = "all";

/// Build the workflow; sources with a `refresh_interval` read their
/// freshness from `history`.
pub fn build_workflow(cfg: &ConfigFile, history: &Arc<dyn HistoryStore>) -> Workflow {
    Workflow::from_nodes(
        cfg.task
            .iter()
            .map(|(name, task)| build_node(name, task, history)),
    )
}

fn build_node(name: &str, task: &TaskConfig, history: &Arc<dyn HistoryStore>) -> TaskNode {
    let mut node = TaskNode::new(name).with_description(task.description.clone());

    if let Some(argv) = &task.cmd {
        node = node.with_command(argv.iter().cloned());
    }
    if let Some(argv) = &task.before_cmd {
        node = node.with_before(Hook::Shell(argv.clone()));
    }
    if let Some(argv) = &task.after_cmd {
        node = node.with_after(Hook::Shell(argv.clone()));
    }
    if let Some(prefix) = &task.log_prefix {
        node = node.with_log_prefix(prefix.clone());
    }
    for dep in &task.after {
        node = node.depends_on(dep.clone());
    }

    let freshness = match (task.needs_update, task.refresh_interval) {
        (Some(fixed), _) => Freshness::Fixed(fixed),
        (None, Some(interval)) => {
            node = node.with_refresh_interval(interval.as_duration());
            interval_freshness(Arc::clone(history), name, interval.as_duration())
        }
        (None, None) => Freshness::Unspecified,
    };

    debug!(task = %name, grouping = node.is_grouping(), "built task node");
    node.with_freshness(freshness)
}

/// Pick the task every cycle is rooted at: the CLI override, then
/// `[config].root`, then the only sink. With several sinks a grouping node
/// named [`GROUP_ROOT`] depending on all of them is added.
pub fn resolve_root(
    cfg: &ConfigFile,
    cli_root: Option<&str>,
    workflow: &mut Workflow,
) -> Result<TaskName> {
    if let Some(root) = cli_root.or(cfg.config.root.as_deref()) {
        if !workflow.contains(root) {
            return Err(RunnerError::TaskNotFound(root.to_string()));
        }
        return Ok(root.to_string());
    }

    let sinks: Vec<TaskName> = workflow.sinks().into_iter().map(str::to_string).collect();
    match sinks.as_slice() {
        [] => Err(RunnerError::ConfigError(
            "workflow has no sink task to use as root".to_string(),
        )),
        [only] => Ok(only.clone()),
        _ => {
            if workflow.contains(GROUP_ROOT) {
                return Err(RunnerError::ConfigError(format!(
                    "several sink tasks and a task named '{GROUP_ROOT}' exist; set [config].root"
                )));
            }
            info!(?sinks, root = GROUP_ROOT, "grouping sink tasks under a synthetic root");
            let group = sinks
                .iter()
                .fold(TaskNode::new(GROUP_ROOT), |node, sink| node.depends_on(sink.clone()));
            workflow.insert(group);
            Ok(GROUP_ROOT.to_string())
        }
    }
}
