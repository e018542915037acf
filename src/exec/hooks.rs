// src/exec/hooks.rs

//! Running before/after hooks.

use std::fs::File;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::dag::{Hook, HookContext};
use crate::errors::{Result, RunnerError};

/// Run `hook` for the task described by `ctx`.
///
/// Shell hooks share the task's log file. Any failure is reported as
/// [`RunnerError::HookFailed`] and aborts the task.
pub async fn run_hook(hook: &Hook, ctx: HookContext<'_>, log: &File) -> Result<()> {
    let fail = |reason: String| RunnerError::HookFailed {
        task: ctx.task.to_string(),
        stage: ctx.stage.as_str(),
        reason,
    };

    match hook {
        Hook::Noop => Ok(()),
        Hook::Function(f) => {
            debug!(task = %ctx.task, stage = ctx.stage.as_str(), "running function hook");
            f(&ctx).map_err(|e| fail(format!("{e:#}")))
        }
        Hook::Shell(argv) => {
            let (program, args) = argv
                .split_first()
                .ok_or_else(|| fail("empty hook command".to_string()))?;

            debug!(task = %ctx.task, stage = ctx.stage.as_str(), cmd = ?argv, "running shell hook");

            let status = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(log.try_clone()?))
                .stderr(Stdio::from(log.try_clone()?))
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|e| fail(format!("spawning {program:?}: {e}")))?;

            if status.success() {
                Ok(())
            } else {
                Err(fail(match status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                }))
            }
        }
    }
}
