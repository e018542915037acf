// src/dag/mod.rs

//! Task graph representation and build planning.
//!
//! - [`node`] defines a single schedulable [`TaskNode`] with its hooks and
//!   freshness predicate.
//! - [`graph`] holds the immutable [`Workflow`] registry and derives the
//!   per-cycle dependency maps from a root task.
//! - [`planner`] turns those maps into ordered rounds, skipping fresh tasks
//!   and propagating "must rerun" downstream.

pub mod graph;
pub mod node;
pub mod planner;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

pub use graph::{DependencyGraph, Workflow};
pub use node::{Freshness, Hook, HookContext, HookStage, TaskNode};
pub use planner::{BuildPlan, Round, plan};
