// src/dag/planner.rs

//! Build-sequence planning.
//!
//! A variant of Kahn's topological sort that also decides which tasks need
//! to run this cycle. Each pass collects the tasks whose dependencies have
//! all been processed, evaluates their freshness, and taints everything
//! downstream of a dirty task so consumers of changed inputs always rerun.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::dag::TaskName;
use crate::dag::graph::{DependencyGraph, Workflow};
use crate::errors::{Result, RunnerError};

/// Tasks that may run concurrently: none depends on another in the same
/// round, and all their dependencies ran (or were fresh) in earlier rounds.
pub type Round = Vec<TaskName>;

/// Ordered rounds produced by [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    rounds: Vec<Round>,
}

impl BuildPlan {
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn into_rounds(self) -> Vec<Round> {
        self.rounds
    }

    /// `true` when nothing needs to run.
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn task_count(&self) -> usize {
        self.rounds.iter().map(Vec::len).sum()
    }

    /// Index of the round scheduling `task`, if it is scheduled at all.
    pub fn round_of(&self, task: &str) -> Option<usize> {
        self.rounds
            .iter()
            .position(|round| round.iter().any(|t| t == task))
    }

    pub fn contains(&self, task: &str) -> bool {
        self.round_of(task).is_some()
    }

    /// Log the plan at info level, one line per task.
    pub fn log(&self, root: &str) {
        if self.rounds.is_empty() {
            info!(root = %root, "every task is fresh; nothing to run");
            return;
        }
        info!(root = %root, rounds = self.rounds.len(), "following tasks will be run");
        for (idx, round) in self.rounds.iter().enumerate() {
            info!(round = idx, "== step {idx}");
            for task in round {
                info!(round = idx, task = %task, "    - {task}");
            }
        }
    }
}

/// Compute the build sequence for `root`.
///
/// `needs_update_default` is used for tasks that have no freshness
/// predicate. Fails with [`RunnerError::CircularDependency`] if the
/// dependency closure of `root` contains a cycle; no partial plan is
/// returned in that case.
pub fn plan(workflow: &Workflow, root: &str, needs_update_default: bool) -> Result<BuildPlan> {
    let DependencyGraph {
        dependents,
        mut indegree,
    } = DependencyGraph::from_root(workflow, root)?;

    // Sorted so rounds (and logs) come out deterministic.
    let mut remaining: BTreeSet<TaskName> = dependents.keys().cloned().collect();
    let mut tainted: HashSet<TaskName> = HashSet::new();
    let mut rounds: Vec<Round> = Vec::new();

    while !remaining.is_empty() {
        let candidates: Vec<TaskName> = remaining
            .iter()
            .filter(|name| indegree.get(*name).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Err(RunnerError::CircularDependency(
                remaining.into_iter().collect(),
            ));
        }

        let mut runnable: Round = Vec::new();

        for name in candidates.iter() {
            if tainted.contains(name) {
                // Everything reachable from a tainted task is already tainted.
                debug!(task = %name, "tainted by an upstream task; scheduling");
                runnable.push(name.clone());
            } else {
                let node = workflow
                    .get(name)
                    .ok_or_else(|| RunnerError::TaskNotFound(name.clone()))?;
                let dirty = node.freshness.needs_update(needs_update_default);
                debug!(task = %name, dirty, "evaluated freshness");

                if dirty {
                    runnable.push(name.clone());
                    taint_downstream(name, &dependents, &mut tainted);
                }
            }

            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                }
            }
            remaining.remove(name);
        }

        if !runnable.is_empty() {
            rounds.push(runnable);
        }
    }

    Ok(BuildPlan { rounds })
}

/// Mark every task reachable from `start` through the dependents map.
///
/// The taint set doubles as the visited set: a tainted task's descendants are
/// already tainted, so the walk never descends into it twice.
fn taint_downstream(
    start: &str,
    dependents: &HashMap<TaskName, Vec<TaskName>>,
    tainted: &mut HashSet<TaskName>,
) {
    let mut stack: Vec<&TaskName> = dependents.get(start).into_iter().flatten().collect();

    while let Some(name) = stack.pop() {
        if !tainted.insert(name.clone()) {
            continue;
        }
        stack.extend(dependents.get(name).into_iter().flatten());
    }
}
