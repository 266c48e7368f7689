//! Task decomposition into dependency chains
//!
//! The decomposer expands a single task into an ordered chain of dependent
//! subtasks using a fixed per-task-type template. Each subtask depends on
//! the previous one, and the first inherits the parent's own dependencies,
//! so the chain slots into an existing graph unchanged.

use crate::task::{Task, TaskStatus};
use tracing::debug;

/// One step of a decomposition template
struct SubtaskTemplate {
    /// Id suffix appended as `{parent}-{suffix}`
    suffix: &'static str,
    /// Description prefix applied to the parent description
    label: &'static str,
}

const FEATURE_CHAIN: &[SubtaskTemplate] = &[
    SubtaskTemplate { suffix: "arch", label: "Architecture design for" },
    SubtaskTemplate { suffix: "impl", label: "Implementation of" },
    SubtaskTemplate { suffix: "test", label: "Testing for" },
];

const BUGFIX_CHAIN: &[SubtaskTemplate] = &[
    SubtaskTemplate { suffix: "repro", label: "Reproduction of" },
    SubtaskTemplate { suffix: "fix", label: "Fix for" },
    SubtaskTemplate { suffix: "verify", label: "Verification of fix for" },
];

const REFACTOR_CHAIN: &[SubtaskTemplate] = &[
    SubtaskTemplate { suffix: "plan", label: "Refactoring plan for" },
    SubtaskTemplate { suffix: "refactor", label: "Refactoring of" },
    SubtaskTemplate { suffix: "verify", label: "Verification of" },
];

/// Result of expanding a task: the updated parent plus its subtask chain
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Parent task carrying the ordered subtask ids
    pub parent: Task,
    /// Subtasks in chain order, each depending on its predecessor
    pub subtasks: Vec<Task>,
}

/// Expands tasks into dependent subtask chains by task type
#[derive(Debug, Clone, Default)]
pub struct TaskDecomposer;

impl TaskDecomposer {
    pub fn new() -> Self {
        Self
    }

    /// Decompose a task into its template chain
    ///
    /// Subtasks inherit the parent's type, priority, and metadata, and are
    /// produced unassigned; the task service picks agents at registration.
    /// Returns `None` for task types without a template.
    pub fn decompose(&self, task: &Task) -> Option<Decomposition> {
        let chain = match task.task_type.to_lowercase().as_str() {
            "feature" => FEATURE_CHAIN,
            "bugfix" => BUGFIX_CHAIN,
            "refactor" => REFACTOR_CHAIN,
            _ => return None,
        };

        let mut subtasks = Vec::with_capacity(chain.len());
        let mut previous_id: Option<String> = None;

        for template in chain {
            let id = format!("{}-{}", task.id, template.suffix);
            let dependencies = match &previous_id {
                // Chain link: depend on the previous subtask only
                Some(prev) => [prev.clone()].into_iter().collect(),
                // Head of the chain inherits the parent's dependencies
                None => task.dependencies.clone(),
            };

            let subtask = Task {
                id: id.clone(),
                description: format!("{}: {}", template.label, task.description),
                task_type: task.task_type.clone(),
                priority: task.priority,
                status: TaskStatus::Pending,
                assigned_agent: None,
                dependencies,
                metadata: task.metadata.clone(),
                subtask_ids: Vec::new(),
                started_at: None,
                completed_at: None,
                result: None,
            };
            previous_id = Some(id);
            subtasks.push(subtask);
        }

        debug!(
            "Decomposed {} into {} subtasks",
            task.id,
            subtasks.len()
        );

        let parent = task
            .clone()
            .with_subtask_ids(subtasks.iter().map(|t| t.id.clone()).collect());

        Some(Decomposition { parent, subtasks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPriority;
    use std::collections::BTreeSet;

    fn feature_task(id: &str) -> Task {
        Task::builder()
            .id(id)
            .description("Add OAuth2 login")
            .task_type("feature")
            .priority(TaskPriority::High)
            .build()
            .unwrap()
    }

    #[test]
    fn test_feature_decomposes_into_arch_impl_test() {
        let decomposer = TaskDecomposer::new();
        let task = feature_task("task-42");

        let decomposition = decomposer.decompose(&task).unwrap();
        assert_eq!(decomposition.subtasks.len(), 3);

        let arch = &decomposition.subtasks[0];
        let implementation = &decomposition.subtasks[1];
        let test = &decomposition.subtasks[2];

        assert_eq!(arch.id, "task-42-arch");
        assert_eq!(implementation.id, "task-42-impl");
        assert_eq!(test.id, "task-42-test");

        assert!(arch.dependencies.is_empty());
        let expected: BTreeSet<String> = ["task-42-arch".to_string()].into_iter().collect();
        assert_eq!(implementation.dependencies, expected);
        let expected: BTreeSet<String> = ["task-42-impl".to_string()].into_iter().collect();
        assert_eq!(test.dependencies, expected);
    }

    #[test]
    fn test_parent_records_ordered_subtask_ids() {
        let decomposer = TaskDecomposer::new();
        let decomposition = decomposer.decompose(&feature_task("task-7")).unwrap();

        assert_eq!(
            decomposition.parent.subtask_ids,
            vec!["task-7-arch", "task-7-impl", "task-7-test"]
        );
    }

    #[test]
    fn test_chain_head_inherits_parent_dependencies() {
        let decomposer = TaskDecomposer::new();
        let task = Task::builder()
            .id("task-9")
            .description("Add audit log export")
            .task_type("feature")
            .dependency("task-8")
            .build()
            .unwrap();

        let decomposition = decomposer.decompose(&task).unwrap();
        let expected: BTreeSet<String> = ["task-8".to_string()].into_iter().collect();
        assert_eq!(decomposition.subtasks[0].dependencies, expected);
        // Later links depend only on their predecessor
        let expected: BTreeSet<String> = ["task-9-arch".to_string()].into_iter().collect();
        assert_eq!(decomposition.subtasks[1].dependencies, expected);
    }

    #[test]
    fn test_subtasks_inherit_priority_and_are_unassigned() {
        let decomposer = TaskDecomposer::new();
        let decomposition = decomposer.decompose(&feature_task("task-3")).unwrap();

        for subtask in &decomposition.subtasks {
            assert_eq!(subtask.priority, TaskPriority::High);
            assert!(subtask.assigned_agent.is_none());
            assert_eq!(subtask.task_type, "feature");
        }
    }

    #[test]
    fn test_bugfix_chain() {
        let decomposer = TaskDecomposer::new();
        let task = Task::builder()
            .id("task-5")
            .description("Crash when saving empty profile")
            .task_type("bugfix")
            .build()
            .unwrap();

        let decomposition = decomposer.decompose(&task).unwrap();
        let ids: Vec<&str> = decomposition.subtasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-5-repro", "task-5-fix", "task-5-verify"]);
    }

    #[test]
    fn test_unknown_type_has_no_template() {
        let decomposer = TaskDecomposer::new();
        let task = Task::builder()
            .id("task-1")
            .description("Sweep the floor")
            .task_type("chore")
            .build()
            .unwrap();

        assert!(decomposer.decompose(&task).is_none());
    }
}
