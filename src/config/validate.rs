// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::errors::{Result, RunnerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RunnerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(RunnerError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.rpc_addr.trim().is_empty() {
        return Err(RunnerError::ConfigError(
            "[config].rpc_addr must not be empty".to_string(),
        ));
    }

    if cfg.config.output_dir.as_os_str().is_empty() {
        return Err(RunnerError::ConfigError(
            "[config].output_dir must not be empty".to_string(),
        ));
    }

    if let Some(root) = &cfg.config.root {
        if !cfg.task.contains_key(root) {
            return Err(RunnerError::ConfigError(format!(
                "[config].root refers to unknown task '{root}'"
            )));
        }
    }

    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        ensure_argv(name, "cmd", task.cmd.as_deref())?;
        ensure_argv(name, "before_cmd", task.before_cmd.as_deref())?;
        ensure_argv(name, "after_cmd", task.after_cmd.as_deref())?;
        validate_log_prefix(name, task)?;

        if task.needs_update.is_some() && task.refresh_interval.is_some() {
            return Err(RunnerError::ConfigError(format!(
                "task '{name}' sets both `needs_update` and `refresh_interval`"
            )));
        }
        if task.refresh_interval.is_some_and(|i| i.as_duration().is_zero()) {
            return Err(RunnerError::ConfigError(format!(
                "task '{name}' has a zero `refresh_interval`"
            )));
        }
    }
    Ok(())
}

fn ensure_argv(task: &str, field: &str, argv: Option<&[String]>) -> Result<()> {
    match argv {
        Some([]) => Err(RunnerError::ConfigError(format!(
            "task '{task}' has an empty `{field}`"
        ))),
        Some([program, ..]) if program.trim().is_empty() => Err(RunnerError::ConfigError(
            format!("task '{task}' has an empty program name in `{field}`"),
        )),
        _ => Ok(()),
    }
}

fn validate_log_prefix(name: &str, task: &TaskConfig) -> Result<()> {
    if let Some(prefix) = &task.log_prefix {
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(RunnerError::ConfigError(format!(
                "task '{name}' has an invalid `log_prefix` '{prefix}'"
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(RunnerError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(RunnerError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task. `after = ["A"]` on B adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(RunnerError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}
