//! Task domain model and related types
//!
//! This module provides the immutable task model for representing units of
//! development work in the Taskforge system. A `Task` is a value: every
//! change of status, agent, timestamps, or result produces a new `Task`
//! through a pure transform, never an in-place mutation.
//!
//! # Examples
//!
//! Creating a new task:
//!
//! ```rust
//! use taskforge_core::task::*;
//!
//! let task = Task::builder()
//!     .id("task-001")
//!     .description("Add rate limiting to the public API")
//!     .task_type("feature")
//!     .priority(TaskPriority::High)
//!     .build()
//!     .unwrap();
//!
//! let started = task.with_status(TaskStatus::InProgress);
//! assert_eq!(started.status, TaskStatus::InProgress);
//! ```

use crate::agent::AgentType;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Represents a unit of work in the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<AgentType>,
    pub dependencies: BTreeSet<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub subtask_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Priority level of a task, ordered from lowest to highest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Status of a task
///
/// Transitions are driven by callers through the task service:
/// `Pending -> InProgress -> {Completed | Failed | Cancelled}`. All three
/// terminal states are sinks; `Cancelled` is only reachable from
/// `Pending`/`InProgress` via an explicit cancel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Check if this status is a terminal sink
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check if a task in this status may be cancelled
    pub fn is_cancellable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl Task {
    /// Create a builder for constructing a Task
    pub fn builder() -> TaskBuilder {
        TaskBuilder::new()
    }

    /// Return a new task with the given status
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Return a new task assigned to the given agent
    pub fn with_agent(mut self, agent: AgentType) -> Self {
        self.assigned_agent = Some(agent);
        self
    }

    /// Return a new task carrying the given result payload
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Return a new task with the started timestamp set
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Return a new task with the completed timestamp set
    pub fn with_completed_at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = Some(completed_at);
        self
    }

    /// Return a new task with the given ordered subtask ids
    pub fn with_subtask_ids(mut self, subtask_ids: Vec<String>) -> Self {
        self.subtask_ids = subtask_ids;
        self
    }

    /// Check whether every declared dependency is in the completed set
    ///
    /// An empty dependency set always starts.
    pub fn can_start(&self, completed: &BTreeSet<String>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Check whether the task carries any dependencies
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Builder for constructing Task instances
///
/// The build step checks only that the required fields are present;
/// business rules live in the callers.
#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    id: Option<String>,
    description: Option<String>,
    task_type: Option<String>,
    priority: Option<TaskPriority>,
    status: Option<TaskStatus>,
    assigned_agent: Option<AgentType>,
    dependencies: BTreeSet<String>,
    metadata: HashMap<String, serde_json::Value>,
    subtask_ids: Vec<String>,
}

impl TaskBuilder {
    /// Create a new task builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task id
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the task description
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the task type (an open string such as "feature" or "bugfix")
    pub fn task_type<S: Into<String>>(mut self, task_type: S) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Set the task priority (defaults to Medium)
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the initial status (defaults to Pending)
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Assign an agent
    pub fn assigned_agent(mut self, agent: AgentType) -> Self {
        self.assigned_agent = Some(agent);
        self
    }

    /// Add a dependency on another task id
    pub fn dependency<S: Into<String>>(mut self, task_id: S) -> Self {
        self.dependencies.insert(task_id.into());
        self
    }

    /// Add multiple dependencies
    pub fn dependencies<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(task_ids.into_iter().map(|id| id.into()));
        self
    }

    /// Attach a metadata entry
    pub fn metadata<S: Into<String>>(mut self, key: S, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a full metadata map
    pub fn metadata_map(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Build the Task instance
    pub fn build(self) -> Result<Task> {
        let id = self
            .id
            .ok_or_else(|| Error::validation("Task id is required"))?;
        let description = self
            .description
            .ok_or_else(|| Error::validation("Task description is required"))?;
        let task_type = self
            .task_type
            .ok_or_else(|| Error::validation("Task type is required"))?;

        Ok(Task {
            id,
            description,
            task_type,
            priority: self.priority.unwrap_or(TaskPriority::Medium),
            status: self.status.unwrap_or(TaskStatus::Pending),
            assigned_agent: self.assigned_agent,
            dependencies: self.dependencies,
            metadata: self.metadata,
            subtask_ids: self.subtask_ids,
            started_at: None,
            completed_at: None,
            result: None,
        })
    }
}
