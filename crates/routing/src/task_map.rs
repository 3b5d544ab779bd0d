//! Static task → tier table.

use prepwise_core::tier::Tier;
use std::collections::HashMap;

/// How a task picks its tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProfile {
    pub tier: Tier,
    /// Pinned tasks keep `tier` regardless of the caller's plan.
    pub pinned: bool,
}

impl TaskProfile {
    pub const fn plan_based(tier: Tier) -> Self {
        Self { tier, pinned: false }
    }

    pub const fn pinned(tier: Tier) -> Self {
        Self { tier, pinned: true }
    }
}

/// Built-in tasks. Anything not listed resolves to `high`.
const BUILTIN_TASKS: &[(&str, TaskProfile)] = &[
    ("generate_topics", TaskProfile::plan_based(Tier::High)),
    ("generate_mcq_activity", TaskProfile::plan_based(Tier::High)),
    ("generate_flashcards", TaskProfile::plan_based(Tier::Medium)),
    ("generate_coding_challenge", TaskProfile::plan_based(Tier::High)),
    ("generate_system_design", TaskProfile::plan_based(Tier::High)),
    ("generate_interview_questions", TaskProfile::plan_based(Tier::High)),
    ("evaluate_answer", TaskProfile::plan_based(Tier::Medium)),
    ("generate_learning_path", TaskProfile::plan_based(Tier::High)),
    ("explain_concept", TaskProfile::pinned(Tier::Medium)),
    ("classify_skill_cluster", TaskProfile::pinned(Tier::Low)),
    ("summarize_session", TaskProfile::pinned(Tier::Low)),
];

const UNKNOWN_TASK: TaskProfile = TaskProfile::plan_based(Tier::High);

#[derive(Debug, Clone)]
pub struct TaskTierMap {
    tasks: HashMap<String, TaskProfile>,
}

impl TaskTierMap {
    /// An empty map: every task resolves to `high`.
    pub fn empty() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// The built-in task catalog.
    pub fn builtin() -> Self {
        Self {
            tasks: BUILTIN_TASKS
                .iter()
                .map(|(name, profile)| (name.to_string(), *profile))
                .collect(),
        }
    }

    pub fn with_task(mut self, task: impl Into<String>, profile: TaskProfile) -> Self {
        self.tasks.insert(task.into(), profile);
        self
    }

    pub fn profile(&self, task: &str) -> TaskProfile {
        self.tasks.get(task).copied().unwrap_or(UNKNOWN_TASK)
    }

    pub fn contains(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }

    /// Known task names, sorted.
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TaskTierMap {
    fn default() -> Self {
        Self::builtin()
    }
}
