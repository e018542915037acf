// tests/process_executor.rs

#![cfg(unix)]

use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, TimeZone};
use tempfile::tempdir;
use workflow_runner::dag::{Freshness, Hook, HookStage, TaskNode, Workflow};
use workflow_runner::engine::{
    HistoryAction, HistoryStore, MemoryHistory, Orchestrator, OrchestratorOptions,
};
use workflow_runner::errors::RunnerError;
use workflow_runner::exec::{ProcessExecutor, log_file_name};
use workflow_runner_test_utils::builders::sh;
use workflow_runner_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn orchestrator(workflow: Workflow, output_dir: &Path, history: Arc<MemoryHistory>) -> Orchestrator {
    let executor = ProcessExecutor::new(output_dir).with_stop_grace(Duration::from_secs(2));
    Orchestrator::new(
        Arc::new(workflow),
        Arc::new(executor),
        history,
        OrchestratorOptions::default(),
    )
}

fn log_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn log_file_name_uses_prefix_and_local_timestamp() {
    let at = Local
        .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
        .single()
        .expect("unambiguous local time");
    assert_eq!(log_file_name("score", at), "score_2024-03-09-07-05-01.log");
}

#[tokio::test]
async fn command_output_lands_in_a_prefixed_log_file() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let logs = dir.path().join("nested").join("logs");

    let workflow = Workflow::from_nodes([TaskNode::new("calc-score")
        .with_command(sh("echo computing"))
        .with_log_prefix("score")
        .with_freshness(Freshness::Fixed(true))]);

    let orch = orchestrator(workflow, &logs, Arc::new(MemoryHistory::new()));
    with_timeout(orch.start("calc-score").wait()).await?;

    let files = log_files(&logs);
    assert_eq!(files.len(), 1, "files: {files:?}");
    assert!(files[0].starts_with("score_") && files[0].ends_with(".log"));

    let contents = std::fs::read_to_string(logs.join(&files[0]))?;
    assert!(contents.contains("computing"));
    Ok(())
}

#[tokio::test]
async fn hooks_run_around_the_command() -> TestResult {
    let dir = tempdir()?;
    let seen: Arc<Mutex<Vec<(String, HookStage)>>> = Arc::new(Mutex::new(Vec::new()));
    let before_seen = Arc::clone(&seen);

    let workflow = Workflow::from_nodes([TaskNode::new("task")
        .with_before(Hook::function(move |ctx| {
            before_seen.lock().unwrap().push((ctx.task.to_string(), ctx.stage));
            Ok(())
        }))
        .with_command(sh("echo body"))
        .with_after(Hook::Shell(sh("echo after-hook")))
        .with_freshness(Freshness::Fixed(true))]);

    let orch = orchestrator(workflow, dir.path(), Arc::new(MemoryHistory::new()));
    with_timeout(orch.start("task").wait()).await?;

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![("task".to_string(), HookStage::Before)]
    );
    let files = log_files(dir.path());
    let contents = std::fs::read_to_string(dir.path().join(&files[0]))?;
    let body = contents.find("body").expect("command output");
    let after = contents.find("after-hook").expect("after hook output");
    assert!(body < after);
    Ok(())
}

#[tokio::test]
async fn failing_before_hook_skips_the_command() -> TestResult {
    let dir = tempdir()?;
    let workflow = Workflow::from_nodes([TaskNode::new("guarded")
        .with_before(Hook::function(|_| anyhow::bail!("precondition not met")))
        .with_command(sh("echo should-not-run"))
        .with_freshness(Freshness::Fixed(true))]);

    let orch = orchestrator(workflow, dir.path(), Arc::new(MemoryHistory::new()));
    let err = with_timeout(orch.start("guarded").wait()).await.unwrap_err();

    match err {
        RunnerError::HookFailed { task, stage, reason } => {
            assert_eq!(task, "guarded");
            assert_eq!(stage, "before");
            assert!(reason.contains("precondition not met"));
        }
        other => panic!("expected HookFailed, got {other:?}"),
    }
    let files = log_files(dir.path());
    let contents = std::fs::read_to_string(dir.path().join(&files[0]))?;
    assert!(!contents.contains("should-not-run"));
    Ok(())
}

#[tokio::test]
async fn unusable_output_dir_fails_the_cycle_with_log_setup() -> TestResult {
    let dir = tempdir()?;
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file in the way")?;

    let workflow = Workflow::from_nodes([TaskNode::new("task")
        .with_command(sh("true"))
        .with_freshness(Freshness::Fixed(true))]);

    let orch = orchestrator(workflow, &blocker, Arc::new(MemoryHistory::new()));
    let err = with_timeout(orch.start("task").wait()).await.unwrap_err();
    assert!(matches!(err, RunnerError::LogSetup { ref task, .. } if task == "task"));
    Ok(())
}

#[tokio::test]
async fn stop_during_a_run_resolves_through_the_interrupt_path() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let history = Arc::new(MemoryHistory::new());
    let workflow = Workflow::from_nodes([
        TaskNode::new("slow")
            .with_command(["sleep", "30"])
            .with_freshness(Freshness::Fixed(true)),
        TaskNode::new("next")
            .with_command(sh("echo next"))
            .depends_on("slow"),
    ]);
    let orch = orchestrator(workflow, dir.path(), Arc::clone(&history));

    let handle = orch.start("next");
    let controller = handle.controller();
    with_timeout(async {
        while controller.busy_tasks().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_eq!(controller.busy_tasks(), vec!["slow"]);

    handle.stop()?;
    let err = with_timeout(handle.wait()).await.unwrap_err();
    assert!(matches!(err, RunnerError::Interrupted(ref task) if task == "slow"));

    assert!(history.latest("slow", HistoryAction::Error)?.is_some());
    assert!(history.latest("next", HistoryAction::Start)?.is_none());

    // Stopping a finished cycle is a control error only.
    assert!(matches!(controller.stop(), Err(RunnerError::NoRunningProcess)));
    Ok(())
}

#[tokio::test]
async fn kill_during_a_run_resolves_through_the_kill_path() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let history = Arc::new(MemoryHistory::new());
    let workflow = Workflow::from_nodes([
        TaskNode::new("slow")
            .with_command(["sleep", "30"])
            .with_freshness(Freshness::Fixed(true)),
        TaskNode::new("next")
            .with_command(sh("echo next"))
            .depends_on("slow"),
    ]);
    let orch = orchestrator(workflow, dir.path(), Arc::clone(&history));

    let handle = orch.start("next");
    let controller = handle.controller();
    with_timeout(async {
        while controller.busy_tasks().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    handle.kill()?;
    assert!(controller.is_cancelled());
    // The kill already won the race for this process.
    assert!(matches!(controller.stop(), Err(RunnerError::NoRunningProcess)));

    let err = with_timeout(handle.wait()).await.unwrap_err();
    assert!(matches!(err, RunnerError::Killed(ref task) if task == "slow"), "got {err:?}");
    assert!(history.latest("slow", HistoryAction::Error)?.is_some());
    assert!(history.latest("next", HistoryAction::Start)?.is_none());
    Ok(())
}

#[tokio::test]
async fn failure_interrupts_the_rest_of_the_round() -> TestResult {
    let dir = tempdir()?;
    let workflow = Workflow::from_nodes([
        TaskNode::new("broken")
            .with_command(sh("sleep 0.2; exit 1"))
            .with_freshness(Freshness::Fixed(true)),
        TaskNode::new("long")
            .with_command(["sleep", "30"])
            .with_freshness(Freshness::Fixed(true)),
        TaskNode::new("top").depends_on("broken").depends_on("long"),
    ]);
    let orch = orchestrator(workflow, dir.path(), Arc::new(MemoryHistory::new()));

    let err = with_timeout(orch.start("top").wait()).await.unwrap_err();
    assert!(matches!(err, RunnerError::CommandFailed { ref task, .. } if task == "broken"));
    Ok(())
}
