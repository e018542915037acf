// src/engine/idle.rs

//! How long to wait before the next cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::engine::history::HistoryStore;

/// Time left until a source updated at `last_update` goes stale again.
/// Never negative; a source that was never updated is already overdue.
pub fn time_until_stale(
    last_update: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Duration {
    let Some(last) = last_update else {
        return Duration::ZERO;
    };
    let Ok(interval) = chrono::Duration::from_std(interval) else {
        return Duration::MAX;
    };
    match last.checked_add_signed(interval) {
        Some(due) => (due - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::MAX,
    }
}

/// Minimum time until any tracked source goes stale, clamped to zero.
///
/// `fallback` is returned when no source tracks an interval. The value is
/// advisory: freshness is re-evaluated at the start of every cycle anyway.
pub fn next_cycle_delay<'a>(
    sources: impl IntoIterator<Item = (&'a str, Duration)>,
    history: &dyn HistoryStore,
    now: DateTime<Utc>,
    fallback: Duration,
) -> Duration {
    let mut delay: Option<Duration> = None;

    for (task, interval) in sources {
        let last = match history.last_success(task) {
            Ok(last) => last,
            Err(e) => {
                warn!(task = %task, error = %e, "history lookup failed; treating source as overdue");
                None
            }
        };
        let wait = time_until_stale(last, interval, now);
        debug!(task = %task, wait_secs = wait.as_secs(), "source refresh due");
        delay = Some(delay.map_or(wait, |d| d.min(wait)));
    }

    delay.unwrap_or(fallback)
}
