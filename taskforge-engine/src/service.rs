//! Task service: the live task registry
//!
//! The service owns the in-memory `taskId -> Task` map plus the set of
//! completed task ids. Tasks are immutable values; every status, agent,
//! timestamp, or result change produces a new snapshot that replaces the
//! stored one. The service assumes single-writer access (see the
//! shared-resource policy in the crate docs); two orchestrators sharing
//! one service require external synchronization that is not provided
//! here.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use taskforge_core::agent::AgentType;
use taskforge_core::decompose::TaskDecomposer;
use taskforge_core::selection::{KeywordStrategy, SelectionStrategy};
use taskforge_core::task::{Task, TaskPriority, TaskStatus};
use tracing::{debug, info};
use uuid::Uuid;

/// Serializable full state of a task service, used for checkpointing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    /// Live tasks, sorted by id for a deterministic shape
    pub tasks: Vec<Task>,
    pub completed_task_ids: BTreeSet<String>,
    pub history: Vec<Task>,
}

/// Owns the live task registry and the completed-id set
pub struct TaskService {
    tasks: HashMap<String, Task>,
    completed_task_ids: BTreeSet<String>,
    /// Cancelled tasks, moved out of the live registry
    history: Vec<Task>,
    strategy: Box<dyn SelectionStrategy>,
}

impl TaskService {
    /// Create a service with the given selection strategy
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Self {
            tasks: HashMap::new(),
            completed_task_ids: BTreeSet::new(),
            history: Vec::new(),
            strategy,
        }
    }

    /// Create a task, assign it an agent via the strategy, and store it
    pub fn create_task(
        &mut self,
        description: impl Into<String>,
        task_type: impl Into<String>,
        priority: TaskPriority,
        metadata: HashMap<String, serde_json::Value>,
        dependencies: BTreeSet<String>,
    ) -> Task {
        let task = Task {
            id: format!("task-{}", Uuid::new_v4()),
            description: description.into(),
            task_type: task_type.into(),
            priority,
            status: TaskStatus::Pending,
            assigned_agent: None,
            dependencies,
            metadata,
            subtask_ids: Vec::new(),
            started_at: None,
            completed_at: None,
            result: None,
        };
        self.register_task(task)
    }

    /// Store a pre-built task, assigning an agent if it has none
    pub fn register_task(&mut self, task: Task) -> Task {
        let task = match task.assigned_agent {
            Some(_) => task,
            None => {
                let agent = self.strategy.select_agent(&task);
                task.with_agent(agent)
            }
        };
        info!(
            "Registered task {} ({}) for {}",
            task.id,
            task.task_type,
            task.assigned_agent
                .map(|a| a.as_str())
                .unwrap_or("unassigned")
        );
        self.tasks.insert(task.id.clone(), task.clone());
        task
    }

    /// Expand a stored task into its subtask chain and re-register it
    ///
    /// The parent is replaced with its subtask-carrying snapshot and every
    /// subtask is registered (agents assigned via the strategy). Returns
    /// the registered subtasks, or `None` if the id is unknown or the task
    /// type has no decomposition template.
    pub fn decompose_task(
        &mut self,
        task_id: &str,
        decomposer: &TaskDecomposer,
    ) -> Option<Vec<Task>> {
        let task = self.tasks.get(task_id)?.clone();
        let decomposition = decomposer.decompose(&task)?;

        self.tasks
            .insert(decomposition.parent.id.clone(), decomposition.parent);
        let registered = decomposition
            .subtasks
            .into_iter()
            .map(|subtask| self.register_task(subtask))
            .collect();
        Some(registered)
    }

    /// Look up a task by id
    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Move a task to InProgress, stamping the start time
    ///
    /// Returns `None` (not an error) if the id is unknown.
    pub fn mark_started(&mut self, task_id: &str) -> Option<Task> {
        let task = self.tasks.get(task_id)?.clone();
        let updated = task
            .with_status(TaskStatus::InProgress)
            .with_started_at(chrono::Utc::now());
        self.tasks.insert(task_id.to_string(), updated.clone());
        debug!("Task {} started", task_id);
        Some(updated)
    }

    /// Move a task to Completed, recording its result payload
    ///
    /// The id is also added to the completed set that dependency checks
    /// consult. Returns `None` if the id is unknown.
    pub fn mark_completed(
        &mut self,
        task_id: &str,
        result: serde_json::Value,
    ) -> Option<Task> {
        let task = self.tasks.get(task_id)?.clone();
        let updated = task
            .with_status(TaskStatus::Completed)
            .with_completed_at(chrono::Utc::now())
            .with_result(result);
        self.tasks.insert(task_id.to_string(), updated.clone());
        self.completed_task_ids.insert(task_id.to_string());
        debug!("Task {} completed", task_id);
        Some(updated)
    }

    /// Move a task to Failed, preserving the error message in the result
    ///
    /// Returns `None` if the id is unknown.
    pub fn mark_failed(&mut self, task_id: &str, message: &str) -> Option<Task> {
        let task = self.tasks.get(task_id)?.clone();
        let updated = task
            .with_status(TaskStatus::Failed)
            .with_completed_at(chrono::Utc::now())
            .with_result(json!({"status": "failed", "error": message}));
        self.tasks.insert(task_id.to_string(), updated.clone());
        debug!("Task {} failed: {}", task_id, message);
        Some(updated)
    }

    /// Reassign a task to a different agent
    ///
    /// Returns `None` if the id is unknown.
    pub fn reassign_agent(&mut self, task_id: &str, agent: AgentType) -> Option<Task> {
        let task = self.tasks.get(task_id)?.clone();
        let updated = task.with_agent(agent);
        self.tasks.insert(task_id.to_string(), updated.clone());
        Some(updated)
    }

    /// Cancel a task, moving it out of the live registry into history
    ///
    /// Only Pending and InProgress tasks may be cancelled; anything else
    /// (or an unknown id) returns `None`. In-flight executions are not
    /// interrupted, only marked.
    pub fn cancel_task(&mut self, task_id: &str) -> Option<Task> {
        if !self.tasks.get(task_id)?.status.is_cancellable() {
            return None;
        }
        let task = self.tasks.remove(task_id)?;
        let cancelled = task.with_status(TaskStatus::Cancelled);
        self.history.push(cancelled.clone());
        info!("Task {} cancelled", task_id);
        Some(cancelled)
    }

    /// List live tasks, optionally filtered by status
    ///
    /// Ordering is exact and deterministic: priority descending
    /// (Critical, High, Medium, Low), then id ascending.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| status.map(|s| task.status == s).unwrap_or(true))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Ids of tasks completed through this service
    pub fn completed_task_ids(&self) -> &BTreeSet<String> {
        &self.completed_task_ids
    }

    /// Cancelled-task history
    pub fn history(&self) -> &[Task] {
        &self.history
    }

    /// Number of live tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Capture the full service state for checkpointing
    pub fn snapshot(&self) -> ServiceSnapshot {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        ServiceSnapshot {
            tasks,
            completed_task_ids: self.completed_task_ids.clone(),
            history: self.history.clone(),
        }
    }

    /// Replace the live state wholesale from a snapshot (no merge)
    pub fn restore_snapshot(&mut self, snapshot: ServiceSnapshot) {
        self.tasks = snapshot
            .tasks
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect();
        self.completed_task_ids = snapshot.completed_task_ids;
        self.history = snapshot.history;
        info!(
            "Restored task service state ({} live tasks)",
            self.tasks.len()
        );
    }
}

impl Default for TaskService {
    fn default() -> Self {
        Self::new(Box::new(KeywordStrategy::new()))
    }
}
