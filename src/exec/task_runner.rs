// src/exec/task_runner.rs

//! Single process invocation with stop/kill arbitration.
//!
//! A [`ProcessRunner`] owns the run state of exactly one invocation:
//!
//! ```text
//! Idle -> Running -> { Stopping | Killing | Completed }
//! ```
//!
//! While running, one coordinating Tokio task races the child's exit
//! against a stop request (SIGINT) and a kill request (SIGKILL). The first
//! one to arrive wins; `stop`/`kill` after that point (or before the child
//! was spawned) fail with [`RunnerError::NoRunningProcess`].
//!
//! A cycle-level cancellation that lands before the spawn is remembered
//! instead, and the runner then refuses to start the child.

use std::fs::File;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::dag::TaskName;
use crate::errors::{Result, RunnerError};

/// Default time a stopped child gets to exit before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// Request delivered to a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Graceful: SIGINT.
    Stop,
    /// Forceful: SIGKILL.
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Stopping,
    Killing,
    Completed,
}

/// How a single invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The task has no command.
    NoCommand,
    /// The child exited with this code.
    Exited(i32),
    /// The child was terminated by a signal nobody here sent.
    Signalled,
    /// The stop request won the race.
    Stopped,
    /// The kill request won the race.
    Killed,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::NoCommand | RunOutcome::Exited(0))
    }

    /// Map the outcome onto the crate's error taxonomy.
    pub fn into_result(self, task: &str) -> Result<()> {
        match self {
            RunOutcome::NoCommand | RunOutcome::Exited(0) => Ok(()),
            RunOutcome::Exited(code) => Err(RunnerError::CommandFailed {
                task: task.to_string(),
                reason: format!("exit code {code}"),
            }),
            RunOutcome::Signalled => Err(RunnerError::CommandFailed {
                task: task.to_string(),
                reason: "terminated by signal".to_string(),
            }),
            RunOutcome::Stopped => Err(RunnerError::Interrupted(task.to_string())),
            RunOutcome::Killed => Err(RunnerError::Killed(task.to_string())),
        }
    }
}

#[derive(Debug)]
struct RunState {
    phase: RunPhase,
    pid: Option<u32>,
    signal_tx: Option<oneshot::Sender<ControlSignal>>,
    /// Cancellation received while still `Idle`.
    pending: Option<ControlSignal>,
}

impl RunState {
    fn complete(&mut self) {
        self.phase = RunPhase::Completed;
        self.signal_tx = None;
    }
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    // A panic while holding this lock leaves the state consistent enough
    // to keep arbitrating.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable view used to stop or kill one invocation from elsewhere.
#[derive(Debug, Clone)]
pub struct RunControl {
    task: TaskName,
    state: Arc<Mutex<RunState>>,
}

impl RunControl {
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn phase(&self) -> RunPhase {
        lock(&self.state).phase
    }

    /// True only between spawn and race resolution.
    pub fn is_busy(&self) -> bool {
        self.phase() == RunPhase::Running
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.state).pid
    }

    /// Ask the child to exit (SIGINT).
    pub fn stop(&self) -> Result<()> {
        self.deliver(ControlSignal::Stop)
    }

    /// Terminate the child unconditionally (SIGKILL).
    pub fn kill(&self) -> Result<()> {
        self.deliver(ControlSignal::Kill)
    }

    /// Like `stop`/`kill`, but a run that has not spawned yet remembers the
    /// signal and will not start its process. Still reports
    /// [`RunnerError::NoRunningProcess`] in that case.
    pub(crate) fn cancel(&self, signal: ControlSignal) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if state.phase == RunPhase::Idle {
                if signal == ControlSignal::Kill || state.pending.is_none() {
                    state.pending = Some(signal);
                }
                debug!(task = %self.task, ?signal, "cancelled before spawn");
                return Err(RunnerError::NoRunningProcess);
            }
        }
        self.deliver(signal)
    }

    fn deliver(&self, signal: ControlSignal) -> Result<()> {
        let mut state = lock(&self.state);
        if state.phase != RunPhase::Running {
            return Err(RunnerError::NoRunningProcess);
        }
        let tx = state.signal_tx.take().ok_or(RunnerError::NoRunningProcess)?;
        state.phase = match signal {
            ControlSignal::Stop => RunPhase::Stopping,
            ControlSignal::Kill => RunPhase::Killing,
        };
        drop(state);

        // The coordinating task holds the receiver until the race resolves.
        if tx.send(signal).is_err() {
            debug!(task = %self.task, ?signal, "process finished while signal was in flight");
        }
        Ok(())
    }
}

/// Runs one task command as a child process.
#[derive(Debug)]
pub struct ProcessRunner {
    task: TaskName,
    command: Option<Vec<String>>,
    stop_grace: Duration,
    state: Arc<Mutex<RunState>>,
    signal_rx: oneshot::Receiver<ControlSignal>,
}

impl ProcessRunner {
    pub fn new(task: impl Into<TaskName>, command: Option<Vec<String>>) -> Self {
        let (signal_tx, signal_rx) = oneshot::channel();
        Self {
            task: task.into(),
            command,
            stop_grace: DEFAULT_STOP_GRACE,
            state: Arc::new(Mutex::new(RunState {
                phase: RunPhase::Idle,
                pid: None,
                signal_tx: Some(signal_tx),
                pending: None,
            })),
            signal_rx,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn control(&self) -> RunControl {
        RunControl {
            task: self.task.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Spawn the command with stdout and stderr appended to `log`, then wait
    /// for the race between completion, stop and kill to resolve.
    ///
    /// `log` stays owned by the caller, who closes it after this returns.
    pub async fn run(self, log: &File) -> Result<RunOutcome> {
        let ProcessRunner {
            task,
            command,
            stop_grace,
            state,
            signal_rx,
        } = self;

        let Some(argv) = command else {
            finish(&state);
            return Ok(RunOutcome::NoCommand);
        };
        let Some((program, args)) = argv.split_first() else {
            finish(&state);
            return Err(RunnerError::CommandFailed {
                task,
                reason: "empty command".to_string(),
            });
        };

        // The lock is held from the pending check until the phase is
        // `Running`, so a cancellation either lands in `pending` or reaches
        // the coordinator.
        let child = {
            let mut guard = lock(&state);
            if let Some(signal) = guard.pending {
                guard.complete();
                info!(task = %task, ?signal, "cycle cancelled; not starting process");
                return Err(RunnerError::Cancelled);
            }

            info!(task = %task, cmd = ?argv, "starting task process");
            let spawn_result = (|| -> std::io::Result<Child> {
                let mut cmd = Command::new(program);
                cmd.args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::from(log.try_clone()?))
                    .stderr(Stdio::from(log.try_clone()?))
                    .kill_on_drop(true);
                cmd.spawn()
            })();

            match spawn_result {
                Ok(child) => {
                    guard.pid = child.id();
                    guard.phase = RunPhase::Running;
                    child
                }
                Err(source) => {
                    guard.complete();
                    return Err(RunnerError::Spawn { task, source });
                }
            }
        };

        let handle = tokio::spawn(coordinate(task, child, signal_rx, state, stop_grace));
        handle
            .await
            .map_err(|e| RunnerError::Other(anyhow::anyhow!("process coordinator failed: {e}")))?
    }
}

fn finish(state: &Mutex<RunState>) {
    lock(state).complete();
}

/// Race the child's exit against stop/kill requests.
async fn coordinate(
    task: TaskName,
    mut child: Child,
    mut signal_rx: oneshot::Receiver<ControlSignal>,
    state: Arc<Mutex<RunState>>,
    stop_grace: Duration,
) -> Result<RunOutcome> {
    let outcome = async {
        let outcome = tokio::select! {
            status = child.wait() => {
                let status = status?;
                // A signal delivered while the exit was being reaped still wins
                // arbitration: its phase was set first.
                match lock(&state).phase {
                    RunPhase::Stopping => RunOutcome::Stopped,
                    RunPhase::Killing => RunOutcome::Killed,
                    _ => outcome_from_status(&task, status),
                }
            }

            signal = &mut signal_rx => {
                match signal {
                    Ok(ControlSignal::Stop) => {
                        info!(task = %task, "stop requested; interrupting process");
                        interrupt(&task, &mut child);
                        wait_with_grace(&task, &mut child, stop_grace).await;
                        RunOutcome::Stopped
                    }
                    Ok(ControlSignal::Kill) => {
                        info!(task = %task, "kill requested; terminating process");
                        if let Err(e) = child.kill().await {
                            warn!(task = %task, error = %e, "failed to kill child process");
                        }
                        RunOutcome::Killed
                    }
                    Err(_) => {
                        // Sender dropped without a request; just wait for exit.
                        let status = child.wait().await?;
                        outcome_from_status(&task, status)
                    }
                }
            }
        };
        Ok::<_, RunnerError>(outcome)
    }
    .await;

    finish(&state);
    outcome
}

fn outcome_from_status(task: &str, status: ExitStatus) -> RunOutcome {
    let outcome = match status.code() {
        Some(code) => RunOutcome::Exited(code),
        None => RunOutcome::Signalled,
    };
    info!(
        task = %task,
        exit_code = status.code().unwrap_or(-1),
        success = status.success(),
        "task process exited"
    );
    outcome
}

#[cfg(unix)]
fn interrupt(task: &str, child: &mut Child) {
    let Some(pid) = child.id() else {
        debug!(task = %task, "process already reaped; nothing to interrupt");
        return;
    };
    // SAFETY: `pid` belongs to a child we own and have not reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        warn!(
            task = %task,
            error = %std::io::Error::last_os_error(),
            "failed to send SIGINT"
        );
    }
}

#[cfg(not(unix))]
fn interrupt(task: &str, child: &mut Child) {
    // No SIGINT equivalent for a child process here; fall back to killing it.
    if let Err(e) = child.start_kill() {
        warn!(task = %task, error = %e, "failed to stop process");
    }
}

async fn wait_with_grace(task: &str, child: &mut Child, grace: Duration) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(task = %task, code = ?status.code(), "process exited after stop");
        }
        Ok(Err(e)) => {
            warn!(task = %task, error = %e, "failed waiting for stopped process");
        }
        Err(_) => {
            warn!(
                task = %task,
                grace_ms = grace.as_millis() as u64,
                "process ignored stop request; killing"
            );
            if let Err(e) = child.kill().await {
                warn!(task = %task, error = %e, "failed to kill child process");
            }
        }
    }
}
