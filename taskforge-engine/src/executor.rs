//! Task executors: the components that invoke agent callbacks
//!
//! Two executors share one contract: [`SyncExecutor`] runs a single task
//! on the current thread, [`AsyncExecutor`] adds dependency-aware,
//! bounded-concurrency batch execution on the tokio runtime. Callers hold
//! the [`TaskExecutor`] trait, never a concrete type.
//!
//! Executors never mutate task state; status transitions are driven by
//! callers through the task service. The async executor keeps its own
//! completed-id set for dependency checks within a batch, independent of
//! the task service's set — callers using both must reconcile the two.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use taskforge_core::agent::AgentType;
use taskforge_core::task::Task;
use taskforge_core::{Error, Result};
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Synchronous agent callback signature
pub type SyncAgentFn = dyn Fn(&Task) -> Result<Value> + Send + Sync;
/// Asynchronous agent callback signature
pub type AsyncAgentFn = dyn Fn(Task) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// An injected agent callback, registered per agent type
///
/// Synchronous callbacks run on the current thread in the sync executor
/// and are dispatched to the blocking thread pool by the async executor so
/// they cannot stall the event loop.
#[derive(Clone)]
pub enum AgentCallback {
    Sync(Arc<SyncAgentFn>),
    Async(Arc<AsyncAgentFn>),
}

impl AgentCallback {
    /// Wrap a synchronous callback
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(&Task) -> Result<Value> + Send + Sync + 'static,
    {
        AgentCallback::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous callback
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        AgentCallback::Async(Arc::new(move |task| f(task).boxed()))
    }
}

impl fmt::Debug for AgentCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentCallback::Sync(_) => f.write_str("AgentCallback::Sync(..)"),
            AgentCallback::Async(_) => f.write_str("AgentCallback::Async(..)"),
        }
    }
}

/// Shared executor contract
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Register the callback invoked for tasks assigned to an agent type
    fn register_callback(&mut self, agent_type: AgentType, callback: AgentCallback);

    /// Look up the registered callback for an agent type
    fn callback(&self, agent_type: AgentType) -> Option<AgentCallback>;

    /// Execute one task and return its output payload
    async fn execute(&self, task: &Task) -> Result<Value>;
}

/// Resolve the task's agent, failing when none is assigned
fn resolve_agent(task: &Task) -> Result<AgentType> {
    task.assigned_agent
        .ok_or_else(|| Error::invalid_agent(format!("task {} has no assigned agent", task.id)))
}

/// Success payload when no callback is registered for the agent
///
/// A missing callback is a deliberate no-op fallback, not a failure.
fn no_callback_output(agent: AgentType) -> Value {
    json!({
        "status": "completed",
        "detail": format!("no callback registered for {}", agent),
    })
}

/// Fold non-map callback returns into the standard output shape
fn normalize_output(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({"status": "completed", "result": value})
    }
}

/// Wrap a callback fault as an execution error, preserving its message
fn wrap_execution(err: Error) -> Error {
    match err {
        Error::Execution { .. } => err,
        other => Error::execution(other.to_string()),
    }
}

/// Invoke a callback under the async runtime
///
/// Sync callbacks go through `spawn_blocking`; panics on either path are
/// converted to execution errors so one task cannot take down a batch.
async fn invoke(task: Task, callback: AgentCallback) -> Result<Value> {
    match callback {
        AgentCallback::Sync(f) => {
            let id = task.id.clone();
            let value = tokio::task::spawn_blocking(move || f(&task))
                .await
                .map_err(|e| Error::execution(format!("agent callback panicked for {}: {}", id, e)))?
                .map_err(wrap_execution)?;
            Ok(normalize_output(value))
        }
        AgentCallback::Async(f) => {
            let id = task.id.clone();
            match AssertUnwindSafe(f(task)).catch_unwind().await {
                Ok(result) => result.map(normalize_output).map_err(wrap_execution),
                Err(_) => Err(Error::execution(format!(
                    "agent callback panicked for {}",
                    id
                ))),
            }
        }
    }
}

/// Executes one task at a time on the current thread
#[derive(Debug, Default)]
pub struct SyncExecutor {
    callbacks: HashMap<AgentType, AgentCallback>,
}

impl SyncExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskExecutor for SyncExecutor {
    fn register_callback(&mut self, agent_type: AgentType, callback: AgentCallback) {
        self.callbacks.insert(agent_type, callback);
    }

    fn callback(&self, agent_type: AgentType) -> Option<AgentCallback> {
        self.callbacks.get(&agent_type).cloned()
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        let agent = resolve_agent(task)?;
        match self.callback(agent) {
            None => Ok(no_callback_output(agent)),
            Some(AgentCallback::Sync(f)) => {
                match std::panic::catch_unwind(AssertUnwindSafe(|| f(task))) {
                    Ok(result) => result.map(normalize_output).map_err(wrap_execution),
                    Err(_) => Err(Error::execution(format!(
                        "agent callback panicked for {}",
                        task.id
                    ))),
                }
            }
            Some(callback @ AgentCallback::Async(_)) => invoke(task.clone(), callback).await,
        }
    }
}

/// Configuration for the async executor
#[derive(Debug, Clone)]
pub struct AsyncExecutorConfig {
    /// Maximum concurrently executing tasks in a batch
    pub max_parallel: usize,
    /// Ceiling on the dependency wait before proceeding anyway
    pub dependency_wait: Duration,
}

impl Default for AsyncExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            dependency_wait: Duration::from_secs(300),
        }
    }
}

/// Per-task outcome of a parallel batch
#[derive(Debug, Clone)]
pub struct TaskRunResult {
    pub task_id: String,
    pub outcome: Result<Value>,
}

/// Dependency-aware, bounded-concurrency executor
///
/// Within one batch, tasks with no interdependency may complete in any
/// order. A task's execution never begins before its dependencies are in
/// the executor's completed-set *or* the wait ceiling is hit; the ceiling
/// breach is logged and the task proceeds anyway (best-effort, never a
/// failure). Cycles are detected up front and warned about, but keep the
/// same wait-out-the-ceiling behavior.
#[derive(Debug)]
pub struct AsyncExecutor {
    callbacks: HashMap<AgentType, AgentCallback>,
    completed: Arc<Mutex<BTreeSet<String>>>,
    notify: Arc<Notify>,
    config: AsyncExecutorConfig,
}

impl AsyncExecutor {
    pub fn new() -> Self {
        Self::with_config(AsyncExecutorConfig::default())
    }

    pub fn with_config(config: AsyncExecutorConfig) -> Self {
        Self {
            callbacks: HashMap::new(),
            completed: Arc::new(Mutex::new(BTreeSet::new())),
            notify: Arc::new(Notify::new()),
            config,
        }
    }

    /// Snapshot of the executor's own completed-id set
    pub async fn completed_ids(&self) -> BTreeSet<String> {
        self.completed.lock().await.clone()
    }

    /// Execute one task after waiting for its declared dependencies
    ///
    /// On success the task id is recorded in the executor's completed-set
    /// and waiters are woken.
    pub async fn execute_with_dependencies(&self, task: &Task) -> Result<Value> {
        wait_for_dependencies(
            task,
            &self.completed,
            &self.notify,
            self.config.dependency_wait,
        )
        .await;

        let value = self.execute(task).await?;
        self.completed.lock().await.insert(task.id.clone());
        self.notify.notify_waiters();
        Ok(value)
    }

    /// Execute a batch concurrently under the parallelism cap
    ///
    /// The executor's completed-set is cleared for the batch. Each task
    /// waits for its dependencies, acquires a semaphore permit, and runs;
    /// per-task faults are captured in the result list — one failure never
    /// aborts the batch. Results come back in input order.
    pub async fn execute_parallel(&self, tasks: Vec<Task>) -> Vec<TaskRunResult> {
        self.completed.lock().await.clear();

        if let Some(cycle) = detect_cycle(&tasks) {
            warn!(
                "Dependency cycle among {:?}; members will wait out the {}s ceiling and proceed",
                cycle,
                self.config.dependency_wait.as_secs()
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let total = tasks.len();
        let mut join_set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let prepared = resolve_agent(&task).map(|agent| (agent, self.callback(agent)));
            let completed = Arc::clone(&self.completed);
            let notify = Arc::clone(&self.notify);
            let semaphore = Arc::clone(&semaphore);
            let ceiling = self.config.dependency_wait;

            join_set.spawn(async move {
                let outcome =
                    run_one(&task, prepared, &completed, &notify, &semaphore, ceiling).await;
                if outcome.is_ok() {
                    completed.lock().await.insert(task.id.clone());
                    notify.notify_waiters();
                    debug!("Task {} finished", task.id);
                } else {
                    warn!("Task {} failed in batch", task.id);
                }
                (index, task.id, outcome)
            });
        }

        let mut slots: Vec<Option<TaskRunResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, task_id, outcome)) => {
                    slots[index] = Some(TaskRunResult { task_id, outcome });
                }
                Err(e) => warn!("Batch worker aborted: {}", e),
            }
        }
        slots.into_iter().flatten().collect()
    }
}

impl Default for AsyncExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for AsyncExecutor {
    fn register_callback(&mut self, agent_type: AgentType, callback: AgentCallback) {
        self.callbacks.insert(agent_type, callback);
    }

    fn callback(&self, agent_type: AgentType) -> Option<AgentCallback> {
        self.callbacks.get(&agent_type).cloned()
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        let agent = resolve_agent(task)?;
        match self.callback(agent) {
            None => Ok(no_callback_output(agent)),
            Some(callback) => invoke(task.clone(), callback).await,
        }
    }
}

/// One batch member: dependency wait, permit acquire, callback invocation
async fn run_one(
    task: &Task,
    prepared: Result<(AgentType, Option<AgentCallback>)>,
    completed: &Mutex<BTreeSet<String>>,
    notify: &Notify,
    semaphore: &Arc<Semaphore>,
    ceiling: Duration,
) -> Result<Value> {
    wait_for_dependencies(task, completed, notify, ceiling).await;

    let _permit = Arc::clone(semaphore)
        .acquire_owned()
        .await
        .map_err(|_| Error::execution("executor semaphore closed"))?;

    match prepared {
        Err(e) => Err(e),
        Ok((agent, None)) => Ok(no_callback_output(agent)),
        Ok((_, Some(callback))) => invoke(task.clone(), callback).await,
    }
}

/// Block until the task's dependencies are satisfied or the ceiling is hit
///
/// Wake-ups are event-driven: every completion notifies waiters, which
/// re-check their dependency sets. Returns `false` on a ceiling breach,
/// which is logged and deliberately non-fatal.
async fn wait_for_dependencies(
    task: &Task,
    completed: &Mutex<BTreeSet<String>>,
    notify: &Notify,
    ceiling: Duration,
) -> bool {
    if !task.has_dependencies() {
        return true;
    }

    let deadline = tokio::time::Instant::now() + ceiling;
    loop {
        // Register interest before checking, so a completion between the
        // check and the await cannot be missed.
        let notified = notify.notified();
        {
            let set = completed.lock().await;
            if task.can_start(&set) {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                "Task {} waited {}s for dependencies; proceeding anyway",
                task.id,
                ceiling.as_secs()
            );
            return false;
        }
        let _ = tokio::time::timeout_at(deadline, notified).await;
    }
}

/// Kahn's algorithm over the batch-internal dependency edges
///
/// Returns the ids caught in a cycle, if any. Detection is advisory: the
/// scheduler still runs cycle members to their wait ceiling.
fn detect_cycle(tasks: &[Task]) -> Option<Vec<String>> {
    let ids: BTreeSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        indegree.entry(task.id.as_str()).or_insert(0);
        for dep in &task.dependencies {
            if ids.contains(dep.as_str()) {
                *indegree.entry(task.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
            }
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut processed = 0usize;
    while let Some(id) = queue.pop_front() {
        processed += 1;
        if let Some(children) = dependents.get(id) {
            for child in children {
                if let Some(degree) = indegree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    if processed == indegree.len() {
        None
    } else {
        let mut cycle: Vec<String> = indegree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        cycle.sort();
        Some(cycle)
    }
}
