// src/exec/log_file.rs

//! Per-run log files for task output.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::dag::TaskNode;
use crate::errors::{Result, RunnerError};

/// Default directory for per-run log files.
pub const DEFAULT_OUTPUT_DIR: &str = "logs";

/// `{log_name}_{YYYY-MM-DD-HH-MM-SS}.log`
pub fn log_file_name(log_name: &str, at: DateTime<Local>) -> String {
    format!("{}_{}.log", log_name, at.format("%Y-%m-%d-%H-%M-%S"))
}

/// An open log file receiving a task's stdout and stderr.
///
/// Dropping it closes the file; the executor keeps it alive until the
/// process runner has returned.
#[derive(Debug)]
pub struct RunLog {
    pub path: PathBuf,
    pub file: File,
}

/// Make sure `output_dir` exists and open a fresh log file for `node` in
/// append mode.
pub fn open_run_log(output_dir: &Path, node: &TaskNode) -> Result<RunLog> {
    let path = output_dir.join(log_file_name(node.log_name(), Local::now()));

    fs::create_dir_all(output_dir).map_err(|source| RunnerError::LogSetup {
        task: node.name.clone(),
        path: output_dir.to_path_buf(),
        source,
    })?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| RunnerError::LogSetup {
            task: node.name.clone(),
            path: path.clone(),
            source,
        })?;

    info!(task = %node.name, log = %path.display(), "running task; output goes to log file");

    Ok(RunLog { path, file })
}
