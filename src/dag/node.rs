// src/dag/node.rs

//! The atomic unit of the workflow graph.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dag::TaskName;

/// Signature of an in-process hook.
pub type HookFn = Arc<dyn Fn(&HookContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Signature of an in-process freshness predicate. Returns `true` when the
/// task needs to run again.
pub type NeedsUpdateFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Which side of the command a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Before,
    After,
}

impl HookStage {
    pub fn as_str(self) -> &'static str {
        match self {
            HookStage::Before => "before",
            HookStage::After => "after",
        }
    }
}

/// Information handed to a hook when it runs.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub task: &'a str,
    pub job_id: &'a str,
    pub stage: HookStage,
}

/// Work attached before or after a task's command.
#[derive(Clone, Default)]
pub enum Hook {
    #[default]
    Noop,
    /// An argument vector run as a child process.
    Shell(Vec<String>),
    /// An in-process function.
    Function(HookFn),
}

impl Hook {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Hook::Function(Arc::new(f))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Hook::Noop)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Noop => f.write_str("Noop"),
            Hook::Shell(argv) => f.debug_tuple("Shell").field(argv).finish(),
            Hook::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Answers "does this task need to run this cycle?".
#[derive(Clone, Default)]
pub enum Freshness {
    /// No predicate; the planner's default applies.
    #[default]
    Unspecified,
    /// Constant answer.
    Fixed(bool),
    Predicate(NeedsUpdateFn),
}

impl Freshness {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Freshness::Predicate(Arc::new(f))
    }

    /// Evaluate the predicate, falling back to `default` when there is none.
    pub fn needs_update(&self, default: bool) -> bool {
        match self {
            Freshness::Unspecified => default,
            Freshness::Fixed(v) => *v,
            Freshness::Predicate(f) => f(),
        }
    }
}

impl fmt::Debug for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Unspecified => f.write_str("Unspecified"),
            Freshness::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            Freshness::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A schedulable task: an optional external command wrapped by optional
/// hooks, plus the names of the tasks it depends on.
///
/// Nodes are built once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub name: TaskName,
    pub description: String,
    pub freshness: Freshness,
    pub before: Hook,
    /// Argument vector `[program, arg...]`.
    pub command: Option<Vec<String>>,
    pub after: Hook,
    /// Prefix for per-run log files; the task name is used when unset.
    pub log_prefix: Option<String>,
    /// Direct dependencies (tasks that must complete before this one).
    pub dependencies: Vec<TaskName>,
    /// How often the external state behind this task goes stale. Tasks
    /// carrying an interval are "sources" for the idle computation.
    pub refresh_interval: Option<Duration>,
}

impl TaskNode {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            freshness: Freshness::Unspecified,
            before: Hook::Noop,
            command: None,
            after: Hook::Noop,
            log_prefix: None,
            dependencies: Vec::new(),
            refresh_interval: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(argv.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_before(mut self, hook: Hook) -> Self {
        self.before = hook;
        self
    }

    pub fn with_after(mut self, hook: Hook) -> Self {
        self.after = hook;
        self
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = Some(prefix.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn depends_on(mut self, dep: impl Into<TaskName>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// A node with no command and no hooks only groups dependencies or
    /// carries a freshness signal; it has nothing to execute.
    pub fn is_grouping(&self) -> bool {
        self.command.is_none() && self.before.is_noop() && self.after.is_noop()
    }

    /// Name used for per-run log files.
    pub fn log_name(&self) -> &str {
        self.log_prefix.as_deref().unwrap_or(&self.name)
    }
}
