// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::dag::TaskName;
use crate::dag::node::TaskNode;
use crate::errors::{Result, RunnerError};

/// Immutable registry of every task node, keyed by name.
///
/// Dependencies are stored by name on each [`TaskNode`]; they are resolved
/// here, so a workflow may be assembled in any order (and may even contain
/// cycles, which the planner reports).
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    nodes: BTreeMap<TaskName, Arc<TaskNode>>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = TaskNode>) -> Self {
        let mut workflow = Self::new();
        for node in nodes {
            workflow.insert(node);
        }
        workflow
    }

    /// Register a node, replacing any previous node with the same name.
    pub fn insert(&mut self, node: TaskNode) -> Option<Arc<TaskNode>> {
        self.nodes.insert(node.name.clone(), Arc::new(node))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TaskNode>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<TaskNode>> {
        self.nodes.values()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks that no other task depends on.
    pub fn sinks(&self) -> Vec<&str> {
        let depended_on: HashSet<&str> = self
            .nodes
            .values()
            .flat_map(|n| n.dependencies.iter().map(|d| d.as_str()))
            .collect();

        self.tasks()
            .filter(|name| !depended_on.contains(name))
            .collect()
    }

    /// Tasks carrying a refresh interval, with that interval.
    pub fn refresh_sources(&self) -> Vec<(&str, Duration)> {
        self.nodes
            .values()
            .filter_map(|n| n.refresh_interval.map(|d| (n.name.as_str(), d)))
            .collect()
    }
}

/// Per-cycle maps derived from a root task's transitive dependencies.
///
/// - `dependents[n]` lists the tasks that declare `n` as a dependency, i.e.
///   the tasks that must rerun when `n` reruns.
/// - `indegree[n]` counts `n`'s own dependencies.
///
/// Tasks unreachable from the root are not included.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub(crate) dependents: HashMap<TaskName, Vec<TaskName>>,
    pub(crate) indegree: HashMap<TaskName, usize>,
}

impl DependencyGraph {
    /// Walk the dependency closure of `root` depth-first, visiting each task
    /// once even when several tasks share an ancestor.
    pub fn from_root(workflow: &Workflow, root: &str) -> Result<Self> {
        if !workflow.contains(root) {
            return Err(RunnerError::TaskNotFound(root.to_string()));
        }

        let mut dependents: HashMap<TaskName, Vec<TaskName>> = HashMap::new();
        let mut indegree: HashMap<TaskName, usize> = HashMap::new();
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut stack: Vec<TaskName> = vec![root.to_string()];

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let node = workflow
                .get(&name)
                .ok_or_else(|| RunnerError::TaskNotFound(name.clone()))?;

            dependents.entry(name.clone()).or_default();
            indegree.insert(name.clone(), node.dependencies.len());

            for dep in node.dependencies.iter() {
                if !workflow.contains(dep) {
                    return Err(RunnerError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                dependents.entry(dep.clone()).or_default().push(name.clone());
                stack.push(dep.clone());
            }
        }

        Ok(Self {
            dependents,
            indegree,
        })
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dependents.contains_key(name)
    }

    /// Tasks that list `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.dependents
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub fn indegree_of(&self, name: &str) -> Option<usize> {
        self.indegree.get(name).copied()
    }
}
