//! Workflow domain model: phases, feature specifications, and reports
//!
//! A workflow drives one feature through the fixed phase sequence
//! `Planning -> Architecture -> Implementation -> Testing -> Review ->
//! Commit -> Complete`, with `Failed` as an absorbing state reachable from
//! any phase. The record is owned exclusively by the work orchestrator for
//! its lifetime and kept as history after a terminal phase.

use crate::task::TaskPriority;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of the fixed feature-workflow sequence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Planning,
    Architecture,
    Implementation,
    Testing,
    Review,
    Commit,
    Complete,
    Failed,
}

impl WorkflowPhase {
    /// The working phases in execution order
    pub const SEQUENCE: [WorkflowPhase; 6] = [
        WorkflowPhase::Planning,
        WorkflowPhase::Architecture,
        WorkflowPhase::Implementation,
        WorkflowPhase::Testing,
        WorkflowPhase::Review,
        WorkflowPhase::Commit,
    ];

    /// Wire name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Planning => "planning",
            WorkflowPhase::Architecture => "architecture",
            WorkflowPhase::Implementation => "implementation",
            WorkflowPhase::Testing => "testing",
            WorkflowPhase::Review => "review",
            WorkflowPhase::Commit => "commit",
            WorkflowPhase::Complete => "complete",
            WorkflowPhase::Failed => "failed",
        }
    }

    /// Check if this phase is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowPhase::Complete | WorkflowPhase::Failed)
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Specification of the feature a workflow delivers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub priority: TaskPriority,
}

impl FeatureSpec {
    /// Create a builder for constructing a FeatureSpec
    pub fn builder() -> FeatureSpecBuilder {
        FeatureSpecBuilder::new()
    }
}

/// Builder for constructing FeatureSpec instances with validation
#[derive(Debug, Clone, Default)]
pub struct FeatureSpecBuilder {
    name: Option<String>,
    description: Option<String>,
    requirements: Vec<String>,
    acceptance_criteria: Vec<String>,
    priority: Option<TaskPriority>,
}

impl FeatureSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feature name
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the feature description
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a requirement
    pub fn requirement<S: Into<String>>(mut self, requirement: S) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    /// Add an acceptance criterion
    pub fn acceptance_criterion<S: Into<String>>(mut self, criterion: S) -> Self {
        self.acceptance_criteria.push(criterion.into());
        self
    }

    /// Set the feature priority (defaults to Medium)
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Build the FeatureSpec instance
    pub fn build(self) -> Result<FeatureSpec> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::validation("Feature name is required"))?;
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| Error::validation("Feature description is required"))?;

        Ok(FeatureSpec {
            name,
            description,
            requirements: self.requirements,
            acceptance_criteria: self.acceptance_criteria,
            priority: self.priority.unwrap_or(TaskPriority::Medium),
        })
    }
}

/// A live workflow record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub spec: FeatureSpec,
    pub task_ids: Vec<String>,
    pub phase: WorkflowPhase,
    pub checkpoint_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Start a new workflow in the Planning phase
    pub fn new(spec: FeatureSpec) -> Self {
        Self {
            id: format!("wf-{}", Uuid::new_v4()),
            spec,
            task_ids: Vec::new(),
            phase: WorkflowPhase::Planning,
            checkpoint_ids: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move the workflow to the given phase
    pub fn advance_to(&mut self, phase: WorkflowPhase) {
        self.phase = phase;
        if phase.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Record a planned task
    pub fn add_task(&mut self, task_id: String) {
        self.task_ids.push(task_id);
    }

    /// Record a checkpoint taken at a phase boundary
    pub fn add_checkpoint(&mut self, checkpoint_id: String) {
        self.checkpoint_ids.push(checkpoint_id);
    }
}

/// Final classification of a finished workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowOutcome {
    Success,
    Partial,
    Failed,
}

/// Summary returned to the caller when a workflow finishes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub workflow_id: String,
    pub status: WorkflowOutcome,
    pub phases_completed: Vec<WorkflowPhase>,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub total_duration_ms: u64,
    pub checkpoints_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FeatureSpec {
        FeatureSpec::builder()
            .name("oauth-login")
            .description("Add OAuth2 login")
            .requirement("Support Google and GitHub providers")
            .acceptance_criterion("Existing sessions stay valid")
            .priority(TaskPriority::High)
            .build()
            .unwrap()
    }

    #[test]
    fn test_phase_sequence() {
        assert_eq!(WorkflowPhase::SEQUENCE.len(), 6);
        assert_eq!(WorkflowPhase::SEQUENCE[0], WorkflowPhase::Planning);
        assert_eq!(WorkflowPhase::SEQUENCE[5], WorkflowPhase::Commit);
        assert!(!WorkflowPhase::SEQUENCE.iter().any(|p| p.is_terminal()));
        assert!(WorkflowPhase::Complete.is_terminal());
        assert!(WorkflowPhase::Failed.is_terminal());
    }

    #[test]
    fn test_feature_spec_builder_validation() {
        let result = FeatureSpec::builder().description("no name").build();
        assert!(result.is_err());

        let result = FeatureSpec::builder().name("  ").description("blank name").build();
        assert!(result.is_err());

        let spec = spec();
        assert_eq!(spec.priority, TaskPriority::High);
        assert_eq!(spec.requirements.len(), 1);
    }

    #[test]
    fn test_workflow_lifecycle() {
        let mut workflow = Workflow::new(spec());
        assert!(workflow.id.starts_with("wf-"));
        assert_eq!(workflow.phase, WorkflowPhase::Planning);
        assert!(workflow.completed_at.is_none());

        workflow.add_task("task-1".to_string());
        workflow.add_checkpoint("cp-001".to_string());
        workflow.advance_to(WorkflowPhase::Architecture);
        assert!(workflow.completed_at.is_none());

        workflow.advance_to(WorkflowPhase::Complete);
        assert!(workflow.completed_at.is_some());
        assert_eq!(workflow.task_ids, vec!["task-1"]);
        assert_eq!(workflow.checkpoint_ids, vec!["cp-001"]);
    }

    #[test]
    fn test_workflow_serialization_round_trip() {
        let workflow = Workflow::new(spec());
        let value = serde_json::to_value(&workflow).unwrap();
        assert_eq!(value["phase"], "planning");
        assert!(value.get("completedAt").is_none());

        let back: Workflow = serde_json::from_value(value).unwrap();
        assert_eq!(back, workflow);
    }
}
