// tests/idle_and_history.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;
use workflow_runner::engine::{
    HistoryAction, HistoryEntry, HistoryStore, JsonlHistory, MemoryHistory, interval_freshness,
    next_cycle_delay, time_until_stale,
};

type TestResult = Result<(), Box<dyn Error>>;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);

fn finished_at(history: &dyn HistoryStore, task: &str, at: chrono::DateTime<Utc>) {
    let mut entry = HistoryEntry::now("job-test", task, HistoryAction::End);
    entry.timestamp = at;
    history.record(entry).expect("record");
}

#[test]
fn time_until_stale_counts_down_from_the_last_update() {
    let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
    assert_eq!(time_until_stale(Some(last), DAY, now), 4 * HOUR);
}

#[test]
fn time_until_stale_never_goes_negative() {
    let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
    assert_eq!(time_until_stale(Some(last), DAY, now), Duration::ZERO);
    assert_eq!(time_until_stale(None, DAY, now), Duration::ZERO);
}

#[test]
fn idle_interval_is_zero_when_every_source_is_overdue() {
    let history = MemoryHistory::new();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    finished_at(&history, "src-a", now - chrono::Duration::days(3));
    // src-b never ran.

    let delay = next_cycle_delay([("src-a", DAY), ("src-b", DAY)], &history, now, DAY);
    assert_eq!(delay, Duration::ZERO);
}

#[test]
fn idle_interval_is_the_minimum_over_sources() {
    let history = MemoryHistory::new();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    finished_at(&history, "src-a", now - chrono::Duration::hours(1));
    finished_at(&history, "src-b", now - chrono::Duration::hours(20));

    let delay = next_cycle_delay([("src-a", DAY), ("src-b", DAY)], &history, now, DAY);
    assert_eq!(delay, 4 * HOUR);
}

#[test]
fn idle_interval_falls_back_without_sources() {
    let history = MemoryHistory::new();
    let delay = next_cycle_delay(std::iter::empty(), &history, Utc::now(), 2 * HOUR);
    assert_eq!(delay, 2 * HOUR);
}

#[test]
fn only_completions_count_as_updates() -> TestResult {
    let history = MemoryHistory::new();
    history.record(HistoryEntry::now("job-1", "src", HistoryAction::Start))?;
    history.record(
        HistoryEntry::now("job-1", "src", HistoryAction::Error).with_payload("boom"),
    )?;

    assert!(history.last_success("src")?.is_none());
    let error = history.latest("src", HistoryAction::Error)?.expect("error entry");
    assert_eq!(error.payload.as_deref(), Some("boom"));
    Ok(())
}

#[test]
fn interval_freshness_follows_the_history() -> TestResult {
    let memory = Arc::new(MemoryHistory::new());
    let history: Arc<dyn HistoryStore> = memory.clone();
    let freshness = interval_freshness(Arc::clone(&history), "src", HOUR);

    // Never updated.
    assert!(freshness.needs_update(false));

    finished_at(&*memory, "src", Utc::now());
    assert!(!freshness.needs_update(true));

    finished_at(&*memory, "src", Utc::now() - chrono::Duration::hours(2));
    assert!(freshness.needs_update(false));
    Ok(())
}

#[test]
fn jsonl_history_survives_reopening() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("state").join("history.jsonl");

    {
        let history = JsonlHistory::new(&path);
        history.record(HistoryEntry::now("job-1", "src", HistoryAction::Start))?;
        history.record(HistoryEntry::now("job-1", "src", HistoryAction::End))?;
    }

    let reopened = JsonlHistory::new(&path);
    let end = reopened.latest("src", HistoryAction::End)?.expect("end entry");
    assert_eq!(end.job_id, "job-1");
    assert!(reopened.last_success("other")?.is_none());
    Ok(())
}

#[test]
fn jsonl_history_skips_malformed_lines() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("history.jsonl");
    let good = serde_json::to_string(&HistoryEntry::now("job-2", "calc", HistoryAction::End))?;
    std::fs::write(&path, format!("not json\n\n{good}\n"))?;

    let history = JsonlHistory::new(&path);
    assert!(history.last_success("calc")?.is_some());
    Ok(())
}

#[test]
fn missing_jsonl_file_is_an_empty_history() -> TestResult {
    let dir = tempdir()?;
    let history = JsonlHistory::new(dir.path().join("absent.jsonl"));
    assert!(history.latest("anything", HistoryAction::Start)?.is_none());
    Ok(())
}
