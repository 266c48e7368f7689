//! Multi-phase feature workflow coordination
//!
//! The orchestrator drives a feature through the fixed phase sequence,
//! executing one task per working phase with a fixed agent assignment,
//! classifying failures into retry/abort recovery actions, and taking a
//! checkpoint after the architecture, implementation, and testing phases.

use crate::checkpoint::CheckpointStore;
use crate::executor::{AgentCallback, TaskExecutor};
use crate::service::{ServiceSnapshot, TaskService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use taskforge_core::agent::AgentType;
use taskforge_core::task::{Task, TaskStatus};
use taskforge_core::workflow::{
    FeatureSpec, Workflow, WorkflowOutcome, WorkflowPhase, WorkflowReport,
};
use taskforge_core::{Error, Result};
use tracing::{error, info, warn};

/// Fixed agent assignment per working phase
///
/// Phase tasks bypass the selection strategy: the phase itself determines
/// the agent. Planning and Commit are bookkeeping transitions and carry no
/// executable task.
const PHASE_AGENTS: &[(WorkflowPhase, AgentType)] = &[
    (WorkflowPhase::Architecture, AgentType::Architect),
    (WorkflowPhase::Implementation, AgentType::BackendDeveloper),
    (WorkflowPhase::Testing, AgentType::QaEngineer),
    (WorkflowPhase::Review, AgentType::CodeReviewer),
];

/// Phases followed by a checkpoint
const CHECKPOINT_PHASES: &[WorkflowPhase] = &[
    WorkflowPhase::Architecture,
    WorkflowPhase::Implementation,
    WorkflowPhase::Testing,
];

/// Recovery decision for a failed phase task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the task once
    Retry,
    /// Abort the workflow immediately
    Abort,
}

/// Markers that make an error message retryable beyond the timeout case
const RETRYABLE_MARKERS: &[&str] = &["connection", "unavailable", "temporarily", "rate limit"];

/// Markers that make an error message a hard abort
const FATAL_MARKERS: &[&str] = &["permission", "access"];

/// Classify an execution failure into a recovery action
///
/// Classification is by substring match on the error message: "timeout"
/// retries once; "permission"/"access" aborts with no retry; other known
/// transient markers retry once; anything else aborts. The fragile string
/// matching is deliberately isolated here so it can be replaced with
/// structured error codes without touching the workflow loop.
pub fn classify_failure(error: &Error) -> RecoveryAction {
    let message = error.to_string().to_lowercase();
    if message.contains("timeout") {
        return RecoveryAction::Retry;
    }
    if FATAL_MARKERS.iter().any(|m| message.contains(m)) {
        return RecoveryAction::Abort;
    }
    if RETRYABLE_MARKERS.iter().any(|m| message.contains(m)) {
        return RecoveryAction::Retry;
    }
    RecoveryAction::Abort
}

/// Orchestrator settings
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Check out the recorded VCS revision when restoring a checkpoint
    pub checkout_on_restore: bool,
}

/// Full orchestration state captured into a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorState {
    pub service: ServiceSnapshot,
    pub workflow: Option<Workflow>,
}

/// Drives feature workflows across the fixed phase sequence
pub struct WorkOrchestrator {
    service: TaskService,
    executor: Box<dyn TaskExecutor>,
    store: CheckpointStore,
    config: OrchestratorConfig,
    /// Workflows retained after reaching a terminal phase
    completed_workflows: Vec<Workflow>,
}

impl WorkOrchestrator {
    pub fn new(
        service: TaskService,
        executor: Box<dyn TaskExecutor>,
        store: CheckpointStore,
    ) -> Self {
        Self::with_config(service, executor, store, OrchestratorConfig::default())
    }

    pub fn with_config(
        service: TaskService,
        executor: Box<dyn TaskExecutor>,
        store: CheckpointStore,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            service,
            executor,
            store,
            config,
            completed_workflows: Vec::new(),
        }
    }

    /// Register an agent callback on the underlying executor
    pub fn register_callback(&mut self, agent_type: AgentType, callback: AgentCallback) {
        self.executor.register_callback(agent_type, callback);
    }

    /// The task service owned by this orchestrator
    pub fn service(&self) -> &TaskService {
        &self.service
    }

    /// The checkpoint store owned by this orchestrator
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Workflows that reached a terminal phase
    pub fn workflow_history(&self) -> &[Workflow] {
        &self.completed_workflows
    }

    /// Execute a feature workflow through all phases
    ///
    /// Phase order is fixed; a hard failure short-circuits the remaining
    /// phases and the workflow record lands in history as Failed.
    pub async fn execute_feature_workflow(&mut self, spec: FeatureSpec) -> Result<WorkflowReport> {
        let started = std::time::Instant::now();
        let mut workflow = Workflow::new(spec);
        info!(
            "Starting workflow {} for feature {}",
            workflow.id, workflow.spec.name
        );

        let mut phase_task_ids: HashMap<WorkflowPhase, String> = HashMap::new();
        let mut phases_completed: Vec<WorkflowPhase> = Vec::new();
        let mut tasks_completed = 0u32;
        let mut tasks_failed = 0u32;
        let mut error_message: Option<String> = None;

        for phase in WorkflowPhase::SEQUENCE {
            workflow.advance_to(phase);
            info!("Workflow {} entering {} phase", workflow.id, phase);

            match phase {
                WorkflowPhase::Planning => {
                    phase_task_ids = self.plan_phase_tasks(&mut workflow);
                    phases_completed.push(phase);
                }
                WorkflowPhase::Commit => {
                    phases_completed.push(phase);
                }
                phase => {
                    let Some(task_id) = phase_task_ids.get(&phase).cloned() else {
                        phases_completed.push(phase);
                        continue;
                    };
                    match self.run_phase_task(&task_id).await {
                        Ok(()) => {
                            tasks_completed += 1;
                            phases_completed.push(phase);
                            if CHECKPOINT_PHASES.contains(&phase) {
                                match self.checkpoint_after(&workflow, phase).await {
                                    Ok(id) => workflow.add_checkpoint(id),
                                    Err(e) => {
                                        warn!("Checkpoint after {} failed: {}", phase, e)
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            tasks_failed += 1;
                            error_message = Some(e.to_string());
                            error!(
                                "Workflow {} failed in {} phase: {}",
                                workflow.id, phase, e
                            );
                            workflow.advance_to(WorkflowPhase::Failed);
                            break;
                        }
                    }
                }
            }
        }

        if workflow.phase != WorkflowPhase::Failed {
            workflow.advance_to(WorkflowPhase::Complete);
            info!("Workflow {} complete", workflow.id);
        }

        let status = if workflow.phase == WorkflowPhase::Complete {
            WorkflowOutcome::Success
        } else if tasks_completed > 0 {
            WorkflowOutcome::Partial
        } else {
            WorkflowOutcome::Failed
        };

        let report = WorkflowReport {
            workflow_id: workflow.id.clone(),
            status,
            phases_completed,
            tasks_completed,
            tasks_failed,
            total_duration_ms: started.elapsed().as_millis() as u64,
            checkpoints_created: workflow.checkpoint_ids.clone(),
            error_message,
        };
        self.completed_workflows.push(workflow);
        Ok(report)
    }

    /// Restore a checkpoint, replacing the live service state wholesale
    ///
    /// Defaults to the latest checkpoint. Returns the workflow record that
    /// was in flight at snapshot time, if any. When configured, the
    /// recorded VCS revision is checked out; checkout failure is logged,
    /// not fatal.
    pub async fn restore_checkpoint(
        &mut self,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<Workflow>> {
        let checkpoint = self.store.restore(checkpoint_id).await?;
        if self.config.checkout_on_restore {
            if let Err(e) = self.store.checkout_revision(&checkpoint) {
                warn!("Could not check out recorded revision: {}", e);
            }
        }

        let state: OrchestratorState = serde_json::from_value(checkpoint.state)?;
        self.service.restore_snapshot(state.service);
        Ok(state.workflow)
    }

    /// Create the four working-phase tasks with their fixed agents
    fn plan_phase_tasks(&mut self, workflow: &mut Workflow) -> HashMap<WorkflowPhase, String> {
        let mut ids = HashMap::new();
        for (phase, agent) in PHASE_AGENTS {
            let task = Task {
                id: format!("{}-{}", workflow.id, phase),
                description: format!(
                    "{} phase for feature: {}",
                    phase, workflow.spec.name
                ),
                task_type: "workflow-phase".to_string(),
                priority: workflow.spec.priority,
                status: TaskStatus::Pending,
                assigned_agent: Some(*agent),
                dependencies: BTreeSet::new(),
                metadata: [
                    ("workflow_id".to_string(), json!(workflow.id)),
                    ("phase".to_string(), json!(phase.as_str())),
                ]
                .into_iter()
                .collect(),
                subtask_ids: Vec::new(),
                started_at: None,
                completed_at: None,
                result: None,
            };
            let task = self.service.register_task(task);
            workflow.add_task(task.id.clone());
            ids.insert(*phase, task.id);
        }
        ids
    }

    /// Execute one phase task with single-retry recovery
    async fn run_phase_task(&mut self, task_id: &str) -> Result<()> {
        let task = self
            .service
            .mark_started(task_id)
            .ok_or_else(|| Error::not_found("Task", task_id))?;

        match self.executor.execute(&task).await {
            Ok(value) => {
                let _ = self.service.mark_completed(task_id, value);
                Ok(())
            }
            Err(first) => match classify_failure(&first) {
                RecoveryAction::Abort => {
                    let _ = self.service.mark_failed(task_id, &first.to_string());
                    Err(first)
                }
                RecoveryAction::Retry => {
                    warn!("Task {} failed ({}), retrying once", task_id, first);
                    match self.executor.execute(&task).await {
                        Ok(value) => {
                            let _ = self.service.mark_completed(task_id, value);
                            Ok(())
                        }
                        Err(second) => {
                            let _ = self.service.mark_failed(task_id, &second.to_string());
                            Err(second)
                        }
                    }
                }
            },
        }
    }

    /// Snapshot the full orchestration state into a checkpoint
    async fn checkpoint_after(
        &mut self,
        workflow: &Workflow,
        phase: WorkflowPhase,
    ) -> Result<String> {
        let state = serde_json::to_value(OrchestratorState {
            service: self.service.snapshot(),
            workflow: Some(workflow.clone()),
        })?;
        let description = format!("{} after {} phase", workflow.id, phase);
        self.store.create(&description, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AsyncExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use taskforge_core::task::TaskPriority;

    fn spec() -> FeatureSpec {
        FeatureSpec::builder()
            .name("oauth-login")
            .description("Add OAuth2 login")
            .requirement("Google and GitHub providers")
            .priority(TaskPriority::High)
            .build()
            .unwrap()
    }

    async fn orchestrator(dir: &std::path::Path) -> WorkOrchestrator {
        let store = CheckpointStore::open(dir).await.unwrap();
        WorkOrchestrator::new(
            TaskService::default(),
            Box::new(AsyncExecutor::new()),
            store,
        )
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure(&Error::execution("timeout waiting for agent")),
            RecoveryAction::Retry
        );
        assert_eq!(
            classify_failure(&Error::execution("permission denied on /etc")),
            RecoveryAction::Abort
        );
        assert_eq!(
            classify_failure(&Error::execution("access revoked")),
            RecoveryAction::Abort
        );
        assert_eq!(
            classify_failure(&Error::execution("connection refused")),
            RecoveryAction::Retry
        );
        assert_eq!(
            classify_failure(&Error::execution("service temporarily down")),
            RecoveryAction::Retry
        );
        assert_eq!(
            classify_failure(&Error::execution("segfault in parser")),
            RecoveryAction::Abort
        );
    }

    #[tokio::test]
    async fn test_workflow_completes_all_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;

        // No callbacks registered: every phase task completes through the
        // executor's no-op fallback.
        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();

        assert_eq!(report.status, WorkflowOutcome::Success);
        assert_eq!(report.phases_completed, WorkflowPhase::SEQUENCE.to_vec());
        assert_eq!(report.tasks_completed, 4);
        assert_eq!(report.tasks_failed, 0);
        assert!(report.error_message.is_none());
        assert_eq!(
            report.checkpoints_created,
            vec!["cp-001", "cp-002", "cp-003"]
        );

        let history = orchestrator.workflow_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].phase, WorkflowPhase::Complete);
        assert!(history[0].completed_at.is_some());
        assert_eq!(history[0].task_ids.len(), 4);

        // All four phase tasks completed in the service
        assert_eq!(
            orchestrator
                .service()
                .list_tasks(Some(TaskStatus::Completed))
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn test_phase_tasks_use_fixed_agents() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;
        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();

        let workflow_id = report.workflow_id;
        let service = orchestrator.service();
        let agent_of = |phase: &str| {
            service
                .get_task(&format!("{}-{}", workflow_id, phase))
                .unwrap()
                .assigned_agent
                .unwrap()
        };
        assert_eq!(agent_of("architecture"), AgentType::Architect);
        assert_eq!(agent_of("implementation"), AgentType::BackendDeveloper);
        assert_eq!(agent_of("testing"), AgentType::QaEngineer);
        assert_eq!(agent_of("review"), AgentType::CodeReviewer);
    }

    #[tokio::test]
    async fn test_timeout_failure_retries_once_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_cb = Arc::clone(&attempts);
        orchestrator.register_callback(
            AgentType::Architect,
            AgentCallback::from_sync(move |_| {
                if attempts_cb.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::execution("timeout waiting for agent"))
                } else {
                    Ok(serde_json::json!({"status": "completed"}))
                }
            }),
        );

        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();
        assert_eq!(report.status, WorkflowOutcome::Success);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(report.tasks_completed, 4);
    }

    #[tokio::test]
    async fn test_permission_failure_aborts_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_cb = Arc::clone(&attempts);
        orchestrator.register_callback(
            AgentType::Architect,
            AgentCallback::from_sync(move |_| {
                attempts_cb.fetch_add(1, Ordering::SeqCst);
                Err(Error::execution("permission denied for workspace"))
            }),
        );

        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();
        assert_eq!(report.status, WorkflowOutcome::Failed);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(report.tasks_completed, 0);
        assert_eq!(report.tasks_failed, 1);
        assert_eq!(report.phases_completed, vec![WorkflowPhase::Planning]);
        assert!(report.checkpoints_created.is_empty());
        assert!(report
            .error_message
            .as_deref()
            .unwrap()
            .contains("permission denied"));

        let history = orchestrator.workflow_history();
        assert_eq!(history[0].phase, WorkflowPhase::Failed);
    }

    #[tokio::test]
    async fn test_second_failure_after_retry_is_a_hard_abort() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_cb = Arc::clone(&attempts);
        orchestrator.register_callback(
            AgentType::Architect,
            AgentCallback::from_sync(move |_| {
                attempts_cb.fetch_add(1, Ordering::SeqCst);
                Err(Error::execution("timeout waiting for agent"))
            }),
        );

        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();
        assert_eq!(report.status, WorkflowOutcome::Failed);
        // One retry, then hard abort
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(report.tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_mid_workflow_failure_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;

        // Architecture succeeds via fallback; implementation hits an
        // unrecoverable fault.
        orchestrator.register_callback(
            AgentType::BackendDeveloper,
            AgentCallback::from_sync(|_| Err(Error::execution("segfault in codegen"))),
        );

        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();
        assert_eq!(report.status, WorkflowOutcome::Partial);
        assert_eq!(report.tasks_completed, 1);
        assert_eq!(report.tasks_failed, 1);
        // Checkpoint after architecture exists; implementation never
        // checkpointed.
        assert_eq!(report.checkpoints_created, vec!["cp-001"]);
        assert_eq!(
            report.phases_completed,
            vec![WorkflowPhase::Planning, WorkflowPhase::Architecture]
        );
    }

    #[tokio::test]
    async fn test_checkpoint_restore_replaces_live_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;
        let report = orchestrator.execute_feature_workflow(spec()).await.unwrap();
        assert_eq!(report.status, WorkflowOutcome::Success);

        // The latest checkpoint was taken right after the testing phase:
        // three tasks completed, review still pending.
        let workflow = orchestrator.restore_checkpoint(None).await.unwrap().unwrap();
        assert_eq!(workflow.phase, WorkflowPhase::Testing);

        let service = orchestrator.service();
        assert_eq!(service.task_count(), 4);
        assert_eq!(service.completed_task_ids().len(), 3);
        // The review task had not started yet at snapshot time
        let review_id = format!("{}-review", report.workflow_id);
        assert_eq!(
            service.get_task(&review_id).unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_restore_unknown_checkpoint_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(dir.path()).await;
        let err = orchestrator.restore_checkpoint(Some("cp-404")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
