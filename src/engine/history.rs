// src/engine/history.rs

//! Job history: who ran when, and how it ended.
//!
//! The history store is the only state that survives restarts. Source tasks
//! read their last successful update from it to decide freshness, and the
//! driver uses it to compute how long to idle between cycles.

use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dag::Freshness;
use crate::errors::{Result, RunnerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Start,
    End,
    Error,
}

/// One row of job history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job_id: String,
    pub task: String,
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl HistoryEntry {
    pub fn now(job_id: &str, task: &str, action: HistoryAction) -> Self {
        Self {
            job_id: job_id.to_string(),
            task: task.to_string(),
            action,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Storage contract for job history.
pub trait HistoryStore: Send + Sync + Debug {
    fn record(&self, entry: HistoryEntry) -> Result<()>;

    /// Most recent entry for `task` with the given action.
    fn latest(&self, task: &str, action: HistoryAction) -> Result<Option<HistoryEntry>>;

    /// Time of the last successful completion of `task`.
    fn last_success(&self, task: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.latest(task, HistoryAction::End)?.map(|e| e.timestamp))
    }
}

/// In-memory history, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded entry, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl HistoryStore for MemoryHistory {
    fn record(&self, entry: HistoryEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| RunnerError::History("history lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }

    fn latest(&self, task: &str, action: HistoryAction) -> Result<Option<HistoryEntry>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| RunnerError::History("history lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .rev()
            .find(|e| e.task == task && e.action == action)
            .cloned())
    }
}

/// Append-only history stored as JSON lines.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping malformed history line"
                ),
            }
        }
        Ok(entries)
    }
}

impl HistoryStore for JsonlHistory {
    fn record(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| RunnerError::History("history lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&entry)
            .map_err(|e| RunnerError::History(format!("encoding history entry: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn latest(&self, task: &str, action: HistoryAction) -> Result<Option<HistoryEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .find(|e| e.task == task && e.action == action))
    }
}

/// Freshness predicate for a source task: dirty when it has never completed
/// or its last completion is at least `interval` old.
pub fn interval_freshness(
    history: Arc<dyn HistoryStore>,
    task: impl Into<String>,
    interval: Duration,
) -> Freshness {
    let task = task.into();
    Freshness::predicate(move || match history.last_success(&task) {
        Ok(Some(last)) => {
            let age = Utc::now().signed_duration_since(last);
            age.to_std().map(|age| age >= interval).unwrap_or(false)
        }
        Ok(None) => true,
        Err(e) => {
            warn!(task = %task, error = %e, "history lookup failed; treating source as stale");
            true
        }
    })
}
