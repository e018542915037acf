// tests/planner_properties.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use workflow_runner::dag::{Freshness, TaskNode, Workflow, plan};

const ROOT: &str = "root";

// Acyclic by construction: task N may only depend on tasks 0..N-1. A final
// `root` task depends on every task so the whole graph is reachable.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = (Workflow, Vec<bool>)> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        );
        let dirty = proptest::collection::vec(any::<bool>(), num_tasks);

        (deps, dirty).prop_map(move |(raw_deps, dirty)| {
            let mut nodes = Vec::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let valid: HashSet<usize> = if i == 0 {
                    HashSet::new()
                } else {
                    potential.into_iter().map(|d| d % i).collect()
                };
                let node = valid.into_iter().fold(
                    TaskNode::new(format!("task_{i}"))
                        .with_command(["true"])
                        .with_freshness(Freshness::Fixed(dirty[i])),
                    |node, d| node.depends_on(format!("task_{d}")),
                );
                nodes.push(node);
            }
            let root = (0..num_tasks).fold(TaskNode::new(ROOT), |node, i| {
                node.depends_on(format!("task_{i}"))
            });
            nodes.push(root);
            (Workflow::from_nodes(nodes), dirty)
        })
    })
}

proptest! {
    #[test]
    fn every_scheduled_task_appears_once_after_its_dependencies(
        (workflow, _dirty) in dag_strategy(12),
        default in any::<bool>(),
    ) {
        let plan = plan(&workflow, ROOT, default).expect("acyclic graph must plan");

        let mut round_of: HashMap<&str, usize> = HashMap::new();
        for (idx, round) in plan.rounds().iter().enumerate() {
            prop_assert!(!round.is_empty());
            for name in round {
                prop_assert!(round_of.insert(name.as_str(), idx).is_none(), "{name} scheduled twice");
            }
        }

        for (name, idx) in round_of.iter() {
            for dep in workflow.dependencies_of(name) {
                if let Some(dep_idx) = round_of.get(dep.as_str()) {
                    prop_assert!(dep_idx < idx, "{dep} (round {dep_idx}) not before {name} (round {idx})");
                }
            }
        }
    }

    #[test]
    fn dirty_tasks_and_their_dependents_are_scheduled(
        (workflow, dirty) in dag_strategy(12),
    ) {
        let plan = plan(&workflow, ROOT, false).expect("acyclic graph must plan");

        // Reference: a task runs iff it or any transitive dependency is dirty.
        let mut must_run: HashMap<String, bool> = HashMap::new();
        for (i, is_dirty) in dirty.iter().enumerate() {
            let name = format!("task_{i}");
            let inherited = workflow
                .dependencies_of(&name)
                .iter()
                .any(|d| must_run.get(d).copied().unwrap_or(false));
            must_run.insert(name, *is_dirty || inherited);
        }
        let any_dirty = dirty.iter().any(|d| *d);
        must_run.insert(ROOT.to_string(), any_dirty);

        for (name, expected) in must_run.iter() {
            prop_assert_eq!(plan.contains(name), *expected, "task {}", name);
        }
        prop_assert_eq!(plan.is_empty(), !any_dirty);
    }
}
