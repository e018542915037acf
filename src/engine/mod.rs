// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`orchestrator`] plans a cycle from a root task and runs its rounds.
//! - [`handle`] is the awaitable, stoppable result of one cycle.
//! - [`history`] records job history and derives source freshness from it.
//! - [`idle`] computes how long the driver waits between cycles.

pub mod handle;
pub mod history;
pub mod idle;
pub mod orchestrator;

pub use handle::{CycleController, OrchestrationHandle};
pub use history::{
    HistoryAction, HistoryEntry, HistoryStore, JsonlHistory, MemoryHistory, interval_freshness,
};
pub use idle::{next_cycle_delay, time_until_stale};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
