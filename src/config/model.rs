// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::control::DEFAULT_RPC_ADDR;
use crate::exec::log_file::DEFAULT_OUTPUT_DIR;
use crate::types::HumanDuration;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// output_dir = "logs"
/// history_file = ".workflow-runner/history.jsonl"
///
/// [task.src-distribution]
/// refresh_interval = "24h"
///
/// [task.update-distribution]
/// cmd = ["./bin/distribution-updater"]
/// after = ["src-distribution"]
/// ```
///
/// Not validated yet; see [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A configuration that passed validation.
///
/// Built through `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { config, task }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Directory for per-run log files. Created on demand.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Planner answer for tasks that carry neither `needs_update` nor
    /// `refresh_interval`.
    #[serde(default)]
    pub needs_update_default: bool,

    /// Address of the control endpoint.
    #[serde(default = "default_rpc_addr")]
    pub rpc_addr: String,

    /// Task every cycle is rooted at. When unset, the only sink of the
    /// graph, or a synthetic group over all sinks.
    #[serde(default)]
    pub root: Option<String>,

    /// JSON-lines job history. History is kept in memory when unset, so
    /// every source is stale again after a restart.
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    /// Wait between cycles when no source tracks a refresh interval.
    #[serde(default = "default_idle_fallback")]
    pub idle_fallback: HumanDuration,

    /// Minimum wait after a failed cycle.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: HumanDuration,

    /// How long an interrupted process may take to exit before it is killed.
    #[serde(default = "default_stop_grace_period")]
    pub stop_grace_period: HumanDuration,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_rpc_addr() -> String {
    DEFAULT_RPC_ADDR.to_string()
}

fn default_idle_fallback() -> HumanDuration {
    HumanDuration(Duration::from_secs(24 * 60 * 60))
}

fn default_retry_delay() -> HumanDuration {
    HumanDuration(Duration::from_secs(60))
}

fn default_stop_grace_period() -> HumanDuration {
    HumanDuration(Duration::from_secs(30))
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            needs_update_default: false,
            rpc_addr: default_rpc_addr(),
            root: None,
            history_file: None,
            idle_fallback: default_idle_fallback(),
            retry_delay: default_retry_delay(),
            stop_grace_period: default_stop_grace_period(),
        }
    }
}

/// `[task.<name>]` section.
///
/// A task without `cmd`, `before_cmd` and `after_cmd` is a pure grouping
/// node: it only orders its dependencies (sources are usually like this).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub description: String,

    /// Argument vector of the command, `[program, arg...]`.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,

    /// Argument vector run before `cmd`.
    #[serde(default)]
    pub before_cmd: Option<Vec<String>>,

    /// Argument vector run after `cmd` succeeded.
    #[serde(default)]
    pub after_cmd: Option<Vec<String>>,

    /// Log file prefix; the task name when unset.
    #[serde(default)]
    pub log_prefix: Option<String>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Fixed answer to "does this task need to run?".
    #[serde(default)]
    pub needs_update: Option<bool>,

    /// Marks the task as a source refreshed at most this often. Freshness
    /// is then derived from job history.
    #[serde(default)]
    pub refresh_interval: Option<HumanDuration>,
}
