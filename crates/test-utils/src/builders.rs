#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use workflow_runner::config::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use workflow_runner::dag::{Freshness, TaskNode, Workflow};
use workflow_runner::types::HumanDuration;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.config.config.root = Some(root.to_string());
        self
    }

    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        self.config.config.output_dir = dir.to_path_buf();
        self
    }

    pub fn with_history_file(mut self, path: &Path) -> Self {
        self.config.config.history_file = Some(path.to_path_buf());
        self
    }

    pub fn with_needs_update_default(mut self, val: bool) -> Self {
        self.config.config.needs_update_default = val;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A task running `argv`.
    pub fn new(argv: &[&str]) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(argv_of(argv)),
                ..TaskConfig::default()
            },
        }
    }

    /// A task with nothing to execute.
    pub fn group() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.task.description = text.to_string();
        self
    }

    pub fn before_cmd(mut self, argv: &[&str]) -> Self {
        self.task.before_cmd = Some(argv_of(argv));
        self
    }

    pub fn after_cmd(mut self, argv: &[&str]) -> Self {
        self.task.after_cmd = Some(argv_of(argv));
        self
    }

    pub fn log_prefix(mut self, prefix: &str) -> Self {
        self.task.log_prefix = Some(prefix.to_string());
        self
    }

    pub fn needs_update(mut self, val: bool) -> Self {
        self.task.needs_update = Some(val);
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.task.refresh_interval = Some(HumanDuration(interval));
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

fn argv_of(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|s| s.to_string()).collect()
}

/// `["sh", "-c", script]`.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// A node with a trivial command that always needs to run.
pub fn dirty_node(name: &str) -> TaskNode {
    TaskNode::new(name)
        .with_command(["true"])
        .with_freshness(Freshness::Fixed(true))
}

/// A node with a trivial command that never needs to run on its own.
pub fn clean_node(name: &str) -> TaskNode {
    TaskNode::new(name)
        .with_command(["true"])
        .with_freshness(Freshness::Fixed(false))
}

/// Build a workflow from `(name, deps, dirty)` triples.
pub fn workflow_of(tasks: &[(&str, &[&str], bool)]) -> Workflow {
    Workflow::from_nodes(tasks.iter().map(|(name, deps, dirty)| {
        let base = if *dirty { dirty_node(name) } else { clean_node(name) };
        deps.iter().fold(base, |node, dep| node.depends_on(*dep))
    }))
}

/// Freshness predicate that counts its evaluations. The answer can be
/// flipped between cycles.
#[derive(Clone)]
pub struct CountingPredicate {
    calls: Arc<AtomicUsize>,
    answer: Arc<AtomicBool>,
}

impl CountingPredicate {
    pub fn new(answer: bool) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            answer: Arc::new(AtomicBool::new(answer)),
        }
    }

    pub fn freshness(&self) -> Freshness {
        let calls = Arc::clone(&self.calls);
        let answer = Arc::clone(&self.answer);
        Freshness::predicate(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            answer.load(Ordering::SeqCst)
        })
    }

    pub fn set_answer(&self, answer: bool) {
        self.answer.store(answer, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
