//! Workflow scheduler
//!
//! Owns every workflow and task. A single execution loop per scheduler
//! pops ready tasks in priority order and fans the executor calls out over
//! at most `max_in_flight_tasks` concurrent attempts:
//!
//! ```text
//! start_workflow ──▶ ReadyQueue ──▶ loop ──spawn──▶ executor attempt
//!                        ▲            │                   │
//!                        │            ◀──── outcome ──────┘
//!                        └── dependents / retries
//! ```
//!
//! Task failures never escape the loop: they are recorded on the task and
//! reported through the event bus.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::executor::{ExecutorError, ExecutorRegistry, SharedExecutor, TaskContext};
use super::queue::{QueueEntry, ReadyQueue};
use super::types::{
    Priority, Task, TaskId, TaskSpec, TaskStatus, Workflow, WorkflowId, WorkflowStatus,
};
use crate::agents::{AgentPairRegistry, Payload};
use crate::config::SchedulerConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::events::{CoordinationEvent, EventBusExt, EventFilter, EventType, SharedEventBus};
use crate::telemetry;

/// Everything needed to create a workflow
#[derive(Debug, Clone, Default)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub tasks: Vec<TaskSpec>,
    pub priority: Priority,
    pub timeout: Option<Duration>,
    pub metadata: Payload,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            name: name.into(),
            tasks,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Point-in-time resource usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_workflows: usize,
    /// Workflows in progress or paused
    pub active_workflows: usize,
    pub queued_tasks: usize,
    pub in_flight_tasks: usize,
}

struct WorkflowEntry {
    workflow: Workflow,
    /// Queue entries held back while the workflow is paused
    parked: Vec<QueueEntry>,
    deadline: Option<Instant>,
}

struct AttemptOutcome {
    workflow_id: WorkflowId,
    task_id: TaskId,
    result: Result<Payload, ExecutorError>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    registry: ExecutorRegistry,
    bus: SharedEventBus,
    workflows: RwLock<HashMap<WorkflowId, WorkflowEntry>>,
    queue: ReadyQueue,
    in_flight: AtomicUsize,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

/// Dependency-aware task scheduler with bounded concurrency
#[derive(Clone)]
pub struct WorkflowScheduler {
    inner: Arc<SchedulerInner>,
}

impl WorkflowScheduler {
    pub fn new(config: SchedulerConfig, registry: ExecutorRegistry, bus: SharedEventBus) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Scheduler limits raised to their minimum");
        }
        let config = config.clamped();
        let (shutdown, _) = watch::channel(false);
        let queue = ReadyQueue::new(config.max_queued_tasks);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                registry,
                bus,
                workflows: RwLock::new(HashMap::new()),
                queue,
                in_flight: AtomicUsize::new(0),
                loop_handle: Mutex::new(None),
                shutdown,
            }),
        }
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // =========================================================================
    // Control surface
    // =========================================================================

    /// Create a pending workflow from task specs
    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        tasks: Vec<TaskSpec>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> CoordinationResult<WorkflowId> {
        let mut definition = WorkflowDefinition::new(name, tasks)
            .with_description(description)
            .with_priority(priority);
        definition.timeout = timeout;
        self.create_from(definition).await
    }

    /// Create a pending workflow from a full definition
    pub async fn create_from(&self, definition: WorkflowDefinition) -> CoordinationResult<WorkflowId> {
        validate_definition(&definition, self.inner.registry.agent_pairs())?;

        let workflow_id = Uuid::new_v4().to_string();
        let timeout_ms = definition.timeout.map(|d| d.as_millis() as u64);
        let now = Utc::now();

        let ids: Vec<TaskId> = definition
            .tasks
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        let index: HashMap<&str, usize> = definition
            .tasks
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.key.as_str(), i))
            .collect();

        let tasks = definition
            .tasks
            .iter()
            .zip(&ids)
            .map(|(spec, id)| Task {
                id: id.clone(),
                workflow_id: workflow_id.clone(),
                key: spec.key.clone(),
                name: spec.name.clone(),
                description: spec.description.clone(),
                kind: spec.kind.clone(),
                agent_pair: spec.agent_pair.clone(),
                priority: spec.priority.unwrap_or(definition.priority),
                dependencies: spec
                    .dependencies
                    .iter()
                    .filter_map(|key| index.get(key.as_str()).map(|&i| ids[i].clone()))
                    .collect(),
                status: TaskStatus::Pending,
                timeout_ms: spec.timeout_ms.or(timeout_ms),
                retry_count: 0,
                max_retries: spec
                    .max_retries
                    .unwrap_or(self.inner.config.default_max_retries),
                skippable: spec.skippable,
                input: spec.input.clone(),
                result: None,
                error: None,
                created_at: now,
                started_at: None,
                completed_at: None,
            })
            .collect::<Vec<_>>();

        let workflow = Workflow {
            id: workflow_id.clone(),
            name: definition.name,
            description: definition.description,
            priority: definition.priority,
            timeout_ms,
            status: WorkflowStatus::Pending,
            tasks,
            metadata: definition.metadata,
            created_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        };

        info!(
            workflow_id = %workflow_id,
            name = %workflow.name,
            tasks = workflow.tasks.len(),
            "Workflow created"
        );

        let mut workflows = self.inner.workflows.write().await;
        workflows.insert(
            workflow_id.clone(),
            WorkflowEntry {
                workflow,
                parked: Vec::new(),
                deadline: None,
            },
        );
        Ok(workflow_id)
    }

    /// Move a pending workflow to in_progress and queue its root tasks
    pub async fn start_workflow(&self, workflow_id: &str) -> CoordinationResult<()> {
        if *self.inner.shutdown.borrow() {
            return Err(CoordinationError::invalid_state(
                "scheduler",
                "loop",
                "shut down",
                "start workflows on",
            ));
        }

        {
            let mut workflows = self.inner.workflows.write().await;

            let status = workflows
                .get(workflow_id)
                .map(|e| e.workflow.status)
                .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))?;
            if status != WorkflowStatus::Pending {
                return Err(CoordinationError::invalid_state(
                    "workflow",
                    workflow_id,
                    status,
                    "start",
                ));
            }

            let active = workflows
                .values()
                .filter(|e| e.workflow.status.is_active())
                .count();
            if active >= self.inner.config.max_concurrent_workflows {
                return Err(CoordinationError::ResourceExhausted {
                    resource: "concurrent workflows",
                    limit: self.inner.config.max_concurrent_workflows,
                });
            }

            let entry = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))?;

            let roots: Vec<QueueEntry> = entry
                .workflow
                .tasks
                .iter()
                .filter(|t| t.dependencies.is_empty())
                .map(|t| self.inner.queue.entry(t.priority, workflow_id, &t.id))
                .collect();

            // The loop cannot dispatch these until the write lock is released.
            self.inner
                .queue
                .try_push_batch(roots.clone())
                .map_err(|limit| CoordinationError::ResourceExhausted {
                    resource: "ready queue",
                    limit,
                })?;

            let root_ids: HashSet<&str> = roots.iter().map(|e| e.task_id.as_str()).collect();
            for task in entry.workflow.tasks.iter_mut() {
                if root_ids.contains(task.id.as_str()) {
                    task.status = TaskStatus::Ready;
                }
            }
            entry.workflow.status = WorkflowStatus::InProgress;
            entry.workflow.started_at = Some(Utc::now());
            entry.deadline = entry
                .workflow
                .timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms));

            telemetry::workflow_span(workflow_id, &entry.workflow.name).in_scope(|| {
                info!(
                    workflow_id = %workflow_id,
                    roots = roots.len(),
                    "Workflow started"
                )
            });
            self.inner.bus.emit(
                CoordinationEvent::workflow(EventType::WorkflowStarted, workflow_id)
                    .with_data("name", entry.workflow.name.clone())
                    .with_data("tasks", entry.workflow.tasks.len()),
            );
        }

        self.ensure_loop();
        Ok(())
    }

    /// Pause an in-progress workflow; in-flight attempts run to completion
    pub async fn pause_workflow(&self, workflow_id: &str) -> CoordinationResult<()> {
        {
            let mut workflows = self.inner.workflows.write().await;
            let entry = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))?;
            if entry.workflow.status != WorkflowStatus::InProgress {
                return Err(CoordinationError::invalid_state(
                    "workflow",
                    workflow_id,
                    entry.workflow.status,
                    "pause",
                ));
            }
            entry.workflow.status = WorkflowStatus::Paused;
            let drained = self.inner.queue.drain_workflow(workflow_id);
            entry.parked.extend(drained);
            info!(workflow_id = %workflow_id, parked = entry.parked.len(), "Workflow paused");
        }

        self.inner
            .bus
            .emit(CoordinationEvent::workflow(EventType::WorkflowPaused, workflow_id));
        Ok(())
    }

    /// Resume a paused workflow, re-queueing parked tasks in original order
    pub async fn resume_workflow(&self, workflow_id: &str) -> CoordinationResult<()> {
        let mut events = vec![CoordinationEvent::workflow(
            EventType::WorkflowResumed,
            workflow_id,
        )];
        let parked = {
            let mut workflows = self.inner.workflows.write().await;
            let entry = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))?;
            if entry.workflow.status != WorkflowStatus::Paused {
                return Err(CoordinationError::invalid_state(
                    "workflow",
                    workflow_id,
                    entry.workflow.status,
                    "resume",
                ));
            }
            entry.workflow.status = WorkflowStatus::InProgress;
            info!(workflow_id = %workflow_id, parked = entry.parked.len(), "Workflow resumed");
            // Attempts that finished during the pause may have been the last ones.
            events.extend(finalize(&mut entry.workflow));
            std::mem::take(&mut entry.parked)
        };

        for event in events {
            self.inner.bus.emit(event);
        }
        for queued in parked {
            self.inner.queue.push(queued);
        }
        Ok(())
    }

    /// Cancel a workflow that has not finished
    pub async fn cancel_workflow(&self, workflow_id: &str) -> CoordinationResult<()> {
        let event = {
            let mut workflows = self.inner.workflows.write().await;
            let entry = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))?;
            if entry.workflow.status.is_terminal() {
                return Err(CoordinationError::invalid_state(
                    "workflow",
                    workflow_id,
                    entry.workflow.status,
                    "cancel",
                ));
            }
            self.inner.cancel_entry(entry, "cancelled by caller")
        };
        self.inner.bus.emit(event);
        Ok(())
    }

    /// Consistent snapshot of a workflow
    pub async fn get_workflow(&self, workflow_id: &str) -> CoordinationResult<Workflow> {
        let workflows = self.inner.workflows.read().await;
        workflows
            .get(workflow_id)
            .map(|e| e.workflow.clone())
            .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))
    }

    /// Snapshots of every workflow, oldest first
    pub async fn list_workflows(&self) -> Vec<Workflow> {
        let workflows = self.inner.workflows.read().await;
        let mut all: Vec<Workflow> = workflows.values().map(|e| e.workflow.clone()).collect();
        all.sort_by_key(|w| w.created_at);
        all
    }

    pub async fn stats(&self) -> SchedulerStats {
        let workflows = self.inner.workflows.read().await;
        SchedulerStats {
            total_workflows: workflows.len(),
            active_workflows: workflows
                .values()
                .filter(|e| e.workflow.status.is_active())
                .count(),
            queued_tasks: self.inner.queue.len(),
            in_flight_tasks: self.inner.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Wait until a workflow reaches a terminal status
    pub async fn wait_for(&self, workflow_id: &str, timeout: Duration) -> CoordinationResult<Workflow> {
        // Subscribe before the first snapshot so no terminal event is missed.
        let mut receiver = self.inner.bus.subscribe_filtered(
            EventFilter::new().workflow(workflow_id).types(vec![
                EventType::WorkflowCompleted,
                EventType::WorkflowFailed,
                EventType::WorkflowCancelled,
            ]),
        );

        let wait = async {
            loop {
                let snapshot = self.get_workflow(workflow_id).await?;
                if snapshot.status.is_terminal() {
                    return Ok(snapshot);
                }
                match receiver.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => {
                        return Err(CoordinationError::execution("event bus closed"))
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CoordinationError::Timeout {
                operation: "finish workflow",
                ms: timeout.as_millis() as u64,
            })?
    }

    /// Stop the execution loop; in-flight attempts are aborted
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let handle = self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scheduler loop ended abnormally: {}", e);
            }
        }
        info!("Scheduler shut down");
    }

    fn ensure_loop(&self) {
        let mut handle = self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let running = handle.as_ref().map_or(false, |h| !h.is_finished());
        if !running {
            let inner = Arc::clone(&self.inner);
            let shutdown = self.inner.shutdown.subscribe();
            *handle = Some(tokio::spawn(run_loop(inner, shutdown)));
            debug!("Scheduler loop spawned");
        }
    }
}

// =============================================================================
// Execution loop
// =============================================================================

async fn run_loop(inner: Arc<SchedulerInner>, mut shutdown: watch::Receiver<bool>) {
    let poll = inner.config.poll_interval();
    let mut running: JoinSet<AttemptOutcome> = JoinSet::new();
    let mut retries: JoinSet<QueueEntry> = JoinSet::new();

    loop {
        if *shutdown.borrow() {
            break;
        }
        let has_slot = running.len() < inner.config.max_in_flight_tasks;

        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            Some(joined) = running.join_next(), if !running.is_empty() => {
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                match joined {
                    Ok(outcome) => inner.handle_outcome(outcome, &mut retries).await,
                    Err(e) => error!("Task attempt was lost: {}", e),
                }
            }

            Some(Ok(entry)) = retries.join_next(), if !retries.is_empty() => {
                inner.queue.push(entry);
            }

            popped = inner.queue.wait_pop(poll), if has_slot => {
                if let Some(entry) = popped {
                    inner.dispatch(entry, &mut running).await;
                }
            }
        }

        if inner.config.enforce_workflow_timeout {
            inner.enforce_deadlines().await;
        }
    }

    running.abort_all();
    retries.abort_all();
    inner.in_flight.store(0, Ordering::SeqCst);
    debug!("Scheduler loop stopped");
}

async fn run_attempt(
    executor: SharedExecutor,
    ctx: TaskContext,
    deadline_ms: Option<u64>,
) -> AttemptOutcome {
    let workflow_id = ctx.workflow_id.clone();
    let task_id = ctx.task_id.clone();
    let span = telemetry::task_span(
        &workflow_id,
        &ctx.key,
        ctx.kind.as_deref().unwrap_or("default"),
        ctx.attempt,
    );

    let attempt = std::panic::AssertUnwindSafe(executor.execute(ctx)).catch_unwind();
    let result = async {
        let caught = match deadline_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), attempt).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(ExecutorError::Timeout { ms })),
            },
            None => attempt.await,
        };
        caught.unwrap_or_else(|panic| Err(ExecutorError::Panicked(panic_message(&*panic))))
    }
    .instrument(span)
    .await;

    AttemptOutcome {
        workflow_id,
        task_id,
        result,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl SchedulerInner {
    async fn dispatch(&self, queued: QueueEntry, running: &mut JoinSet<AttemptOutcome>) {
        let (ctx, deadline_ms, started) = {
            let mut workflows = self.workflows.write().await;
            let Some(entry) = workflows.get_mut(&queued.workflow_id) else {
                return;
            };
            match entry.workflow.status {
                WorkflowStatus::InProgress => {}
                WorkflowStatus::Paused => {
                    entry.parked.push(queued);
                    return;
                }
                _ => return,
            }

            let workflow = &mut entry.workflow;
            let Some(idx) = workflow.task_index(&queued.task_id) else {
                return;
            };
            if workflow.tasks[idx].status != TaskStatus::Ready {
                return;
            }

            let dependency_results: HashMap<String, Payload> = workflow.tasks[idx]
                .dependencies
                .iter()
                .filter_map(|dep| workflow.task(dep))
                .filter_map(|dep| dep.result.clone().map(|r| (dep.key.clone(), r)))
                .collect();

            let task = &mut workflow.tasks[idx];
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            let attempt = task.retry_count + 1;

            let ctx = TaskContext {
                workflow_id: task.workflow_id.clone(),
                task_id: task.id.clone(),
                key: task.key.clone(),
                name: task.name.clone(),
                description: task.description.clone(),
                kind: task.kind.clone(),
                agent_pair: task.agent_pair.clone(),
                input: task.input.clone(),
                attempt,
                dependency_results,
            };
            let started = CoordinationEvent::step(EventType::StepStarted, &task.workflow_id, &task.id)
                .with_data("task_key", task.key.clone())
                .with_data("attempt", attempt);
            (ctx, task.timeout_ms, started)
        };

        debug!(
            workflow_id = %ctx.workflow_id,
            task = %ctx.key,
            attempt = ctx.attempt,
            "Dispatching task"
        );
        self.bus.emit(started);

        let executor = self.registry.resolve(ctx.kind.as_deref());
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        running.spawn(run_attempt(executor, ctx, deadline_ms));
    }

    async fn handle_outcome(&self, outcome: AttemptOutcome, retries: &mut JoinSet<QueueEntry>) {
        let mut events = Vec::new();
        let mut ready = Vec::new();
        let mut retry = None;

        {
            let mut workflows = self.workflows.write().await;
            let Some(entry) = workflows.get_mut(&outcome.workflow_id) else {
                return;
            };
            let workflow = &mut entry.workflow;
            // Cancelled workflows record in-flight results but schedule nothing.
            let live = workflow.status.is_active();
            let Some(idx) = workflow.task_index(&outcome.task_id) else {
                return;
            };

            match outcome.result {
                Ok(payload) => {
                    let task = &mut workflow.tasks[idx];
                    task.status = TaskStatus::Completed;
                    task.result = Some(payload);
                    task.error = None;
                    task.completed_at = Some(Utc::now());
                    info!(workflow_id = %task.workflow_id, task = %task.key, "Task completed");
                    events.push(
                        CoordinationEvent::step(EventType::StepCompleted, &task.workflow_id, &task.id)
                            .with_data("task_key", task.key.clone())
                            .with_data("attempts", task.retry_count + 1),
                    );
                    if live {
                        ready = promote_ready(workflow, &self.queue);
                    }
                }
                Err(err) => {
                    let task = &mut workflow.tasks[idx];
                    task.error = Some(err.to_string());
                    if live && task.retry_count < task.max_retries {
                        task.retry_count += 1;
                        task.status = TaskStatus::Ready;
                        warn!(
                            workflow_id = %task.workflow_id,
                            task = %task.key,
                            retry = task.retry_count,
                            max_retries = task.max_retries,
                            "Task attempt failed, retrying: {}", err
                        );
                        events.push(
                            CoordinationEvent::step(EventType::StepRetrying, &task.workflow_id, &task.id)
                                .with_data("task_key", task.key.clone())
                                .with_data("error", err.to_string())
                                .with_data("next_attempt", task.retry_count + 1),
                        );
                        retry = Some(self.queue.entry(task.priority, &task.workflow_id, &task.id));
                    } else {
                        task.status = TaskStatus::Failed;
                        task.completed_at = Some(Utc::now());
                        warn!(
                            workflow_id = %task.workflow_id,
                            task = %task.key,
                            attempts = task.retry_count + 1,
                            "Task failed: {}", err
                        );
                        events.push(
                            CoordinationEvent::step(EventType::StepFailed, &task.workflow_id, &task.id)
                                .with_data("task_key", task.key.clone())
                                .with_data("error", err.to_string())
                                .with_data("attempts", task.retry_count + 1),
                        );
                        if live {
                            events.extend(cascade_failure(workflow, idx));
                        }
                    }
                }
            }

            events.extend(finalize(workflow));
        }

        for event in events {
            self.bus.emit(event);
        }
        for queued in ready {
            self.queue.push(queued);
        }
        if let Some(queued) = retry {
            let backoff = self.config.retry_backoff();
            if backoff.is_zero() {
                self.queue.push(queued);
            } else {
                retries.spawn(async move {
                    tokio::time::sleep(backoff).await;
                    queued
                });
            }
        }
    }

    /// Mark the workflow cancelled and drop its queued work
    fn cancel_entry(&self, entry: &mut WorkflowEntry, reason: &str) -> CoordinationEvent {
        let workflow = &mut entry.workflow;
        workflow.status = WorkflowStatus::Cancelled;
        workflow.completed_at = Some(Utc::now());
        workflow.error = Some(reason.to_string());

        self.queue.drain_workflow(&workflow.id);
        entry.parked.clear();
        for task in workflow.tasks.iter_mut() {
            if task.status == TaskStatus::Ready {
                task.status = TaskStatus::Pending;
            }
        }

        info!(workflow_id = %workflow.id, reason, "Workflow cancelled");
        CoordinationEvent::workflow(EventType::WorkflowCancelled, &workflow.id)
            .with_data("reason", reason.to_string())
    }

    async fn enforce_deadlines(&self) {
        let now = Instant::now();
        let events: Vec<CoordinationEvent> = {
            let mut workflows = self.workflows.write().await;
            workflows
                .values_mut()
                .filter(|e| e.workflow.status.is_active())
                .filter(|e| e.deadline.is_some_and(|d| d <= now))
                .map(|e| self.cancel_entry(e, "timeout"))
                .collect()
        };
        for event in events {
            self.bus.emit(event);
        }
    }
}

// =============================================================================
// Graph helpers
// =============================================================================

fn validate_definition(
    definition: &WorkflowDefinition,
    pairs: &AgentPairRegistry,
) -> CoordinationResult<()> {
    if definition.tasks.is_empty() {
        return Err(CoordinationError::invalid_argument(
            "workflow must contain at least one task",
        ));
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for spec in &definition.tasks {
        if spec.key.trim().is_empty() {
            return Err(CoordinationError::invalid_argument("task key must not be empty"));
        }
        let node = graph.add_node(spec.key.as_str());
        if nodes.insert(spec.key.as_str(), node).is_some() {
            return Err(CoordinationError::invalid_argument(format!(
                "duplicate task key {:?}",
                spec.key
            )));
        }
        if let Some(pair) = &spec.agent_pair {
            if !pairs.contains(pair) {
                return Err(CoordinationError::invalid_argument(format!(
                    "task {:?} names unknown agent pair {:?}",
                    spec.key, pair
                )));
            }
        }
    }

    for spec in &definition.tasks {
        let Some(&to) = nodes.get(spec.key.as_str()) else {
            continue;
        };
        for dep in &spec.dependencies {
            let from = nodes.get(dep.as_str()).ok_or_else(|| {
                CoordinationError::invalid_argument(format!(
                    "task {:?} depends on unknown task {:?}",
                    spec.key, dep
                ))
            })?;
            graph.add_edge(*from, to, ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        CoordinationError::invalid_argument(format!(
            "dependency cycle through task {:?}",
            graph[cycle.node_id()]
        ))
    })?;
    Ok(())
}

/// Move pending tasks whose prerequisites all completed to ready
fn promote_ready(workflow: &mut Workflow, queue: &ReadyQueue) -> Vec<QueueEntry> {
    let completed: HashSet<TaskId> = workflow
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id.clone())
        .collect();

    let mut entries = Vec::new();
    for task in workflow.tasks.iter_mut() {
        if task.status == TaskStatus::Pending
            && task.dependencies.iter().all(|d| completed.contains(d))
        {
            task.status = TaskStatus::Ready;
            entries.push(queue.entry(task.priority, &task.workflow_id, &task.id));
        }
    }
    entries
}

/// Block (or skip) every transitive dependent of a failed task
fn cascade_failure(workflow: &mut Workflow, failed_idx: usize) -> Vec<CoordinationEvent> {
    let mut events = Vec::new();
    let mut frontier = VecDeque::from([workflow.tasks[failed_idx].id.clone()]);

    while let Some(dead) = frontier.pop_front() {
        for task in workflow.tasks.iter_mut() {
            if task.status != TaskStatus::Pending || !task.dependencies.contains(&dead) {
                continue;
            }
            let (status, event_type) = if task.skippable {
                (TaskStatus::Skipped, EventType::StepSkipped)
            } else {
                (TaskStatus::Blocked, EventType::StepBlocked)
            };
            task.status = status;
            task.completed_at = Some(Utc::now());
            task.error = Some(format!("prerequisite {dead} did not complete"));
            debug!(workflow_id = %task.workflow_id, task = %task.key, status = %status, "Dependent task not runnable");
            events.push(
                CoordinationEvent::step(event_type, &task.workflow_id, &task.id)
                    .with_data("task_key", task.key.clone())
                    .with_data("prerequisite", dead.clone()),
            );
            frontier.push_back(task.id.clone());
        }
    }
    events
}

/// Complete or fail an in-progress workflow once no task can make progress
fn finalize(workflow: &mut Workflow) -> Option<CoordinationEvent> {
    if workflow.status != WorkflowStatus::InProgress {
        return None;
    }
    let progress = workflow.progress();
    if !progress.all_terminal() {
        return None;
    }

    workflow.completed_at = Some(Utc::now());
    if progress.completed + progress.skipped == progress.total {
        workflow.status = WorkflowStatus::Completed;
        info!(workflow_id = %workflow.id, "Workflow completed");
        Some(
            CoordinationEvent::workflow(EventType::WorkflowCompleted, &workflow.id)
                .with_data("completed", progress.completed)
                .with_data("skipped", progress.skipped),
        )
    } else {
        workflow.status = WorkflowStatus::Failed;
        workflow.error = Some(format!(
            "{} task(s) failed, {} blocked",
            progress.failed, progress.blocked
        ));
        warn!(
            workflow_id = %workflow.id,
            failed = progress.failed,
            blocked = progress.blocked,
            "Workflow failed"
        );
        Some(
            CoordinationEvent::workflow(EventType::WorkflowFailed, &workflow.id)
                .with_data("failed", progress.failed)
                .with_data("blocked", progress.blocked)
                .with_data("completed", progress.completed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentRole, FnAgentPair};
    use crate::events::EventBus;
    use crate::workflow::executor::FnExecutor;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn ok_executor() -> SharedExecutor {
        Arc::new(FnExecutor::new(|ctx: TaskContext| {
            async move {
                let mut out = Payload::new();
                out.insert("key".into(), json!(ctx.key));
                Ok(out)
            }
            .boxed()
        }))
    }

    fn scheduler_with(executor: SharedExecutor, config: SchedulerConfig) -> WorkflowScheduler {
        WorkflowScheduler::new(
            config,
            ExecutorRegistry::with_default(executor),
            EventBus::new().shared(),
        )
    }

    fn scheduler() -> WorkflowScheduler {
        scheduler_with(ok_executor(), SchedulerConfig::default())
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_create_rejects_empty() {
        let err = scheduler()
            .create_workflow("empty", "", vec![], Priority::Medium, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_graphs() {
        let s = scheduler();

        let dup = vec![TaskSpec::new("a", "A"), TaskSpec::new("a", "A again")];
        assert!(s.create_workflow("dup", "", dup, Priority::Medium, None).await.is_err());

        let unknown = vec![TaskSpec::new("a", "A").depends_on("ghost")];
        let err = s
            .create_workflow("unknown", "", unknown, Priority::Medium, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));

        let cycle = vec![
            TaskSpec::new("a", "A").depends_on("b"),
            TaskSpec::new("b", "B").depends_on("a"),
        ];
        let err = s
            .create_workflow("cycle", "", cycle, Priority::Medium, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));

        let self_loop = vec![TaskSpec::new("a", "A").depends_on("a")];
        assert!(s
            .create_workflow("loop", "", self_loop, Priority::Medium, None)
            .await
            .is_err());

        let pair = vec![TaskSpec::new("a", "A").agent_pair("nobody")];
        assert!(s.create_workflow("pair", "", pair, Priority::Medium, None).await.is_err());
        assert!(s.list_workflows().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let s = scheduler();
        let id = s
            .create_workflow(
                "defaults",
                "",
                vec![
                    TaskSpec::new("a", "A"),
                    TaskSpec::new("b", "B")
                        .depends_on("a")
                        .priority(Priority::Low)
                        .timeout_ms(50)
                        .max_retries(0),
                ],
                Priority::High,
                Some(Duration::from_secs(2)),
            )
            .await
            .unwrap();

        let wf = s.get_workflow(&id).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Pending);
        let a = wf.task_by_key("a").unwrap();
        let b = wf.task_by_key("b").unwrap();
        assert_eq!(a.priority, Priority::High);
        assert_eq!(a.timeout_ms, Some(2000));
        assert_eq!(a.max_retries, 3);
        assert_eq!(b.priority, Priority::Low);
        assert_eq!(b.timeout_ms, Some(50));
        assert_eq!(b.max_retries, 0);
        assert_eq!(b.dependencies, vec![a.id.clone()]);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let s = scheduler();
        let id = s
            .create_workflow("once", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();
        let err = s.start_workflow(&id).await.unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidState { .. }));

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(s.start_workflow(&id).await.is_err());
        assert!(matches!(
            s.start_workflow("missing").await.unwrap_err(),
            CoordinationError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_workflow_ceiling() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let g = Arc::clone(&gate);
        let blocking: SharedExecutor = Arc::new(FnExecutor::new(move |_ctx: TaskContext| {
            let g = Arc::clone(&g);
            async move {
                g.notified().await;
                Ok(Payload::new())
            }
            .boxed()
        }));
        let config = SchedulerConfig {
            max_concurrent_workflows: 1,
            ..Default::default()
        };
        let s = scheduler_with(blocking, config);

        let first = s
            .create_workflow("first", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
            .await
            .unwrap();
        let second = s
            .create_workflow("second", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
            .await
            .unwrap();

        s.start_workflow(&first).await.unwrap();
        let err = s.start_workflow(&second).await.unwrap_err();
        assert!(matches!(err, CoordinationError::ResourceExhausted { limit: 1, .. }));
        assert!(err.is_retryable());
        assert_eq!(
            s.get_workflow(&second).await.unwrap().status,
            WorkflowStatus::Pending
        );

        s.cancel_workflow(&first).await.unwrap();
        gate.notify_waiters();
        s.start_workflow(&second).await.unwrap();
        s.cancel_workflow(&second).await.unwrap();
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_queue_capacity_is_resource_exhausted() {
        let config = SchedulerConfig {
            max_queued_tasks: 1,
            ..Default::default()
        };
        let s = scheduler_with(ok_executor(), config);
        let id = s
            .create_workflow(
                "wide",
                "",
                vec![TaskSpec::new("a", "A"), TaskSpec::new("b", "B")],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        let err = s.start_workflow(&id).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::ResourceExhausted {
                resource: "ready queue",
                ..
            }
        ));
        assert_eq!(s.get_workflow(&id).await.unwrap().status, WorkflowStatus::Pending);
    }

    #[tokio::test]
    async fn test_results_flow_to_dependents() {
        let executor: SharedExecutor = Arc::new(FnExecutor::new(|ctx: TaskContext| {
            async move {
                let mut out = Payload::new();
                let upstream: Vec<String> = {
                    let mut keys: Vec<_> = ctx.dependency_results.keys().cloned().collect();
                    keys.sort();
                    keys
                };
                out.insert("saw".into(), json!(upstream));
                Ok(out)
            }
            .boxed()
        }));
        let s = scheduler_with(executor, SchedulerConfig::default());
        let id = s
            .create_workflow(
                "chain",
                "",
                vec![
                    TaskSpec::new("a", "A"),
                    TaskSpec::new("b", "B"),
                    TaskSpec::new("c", "C").depends_on("a").depends_on("b"),
                ],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        let c = wf.task_by_key("c").unwrap();
        assert_eq!(c.result.as_ref().unwrap()["saw"], json!(["a", "b"]));
        assert_eq!(wf.results().len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let slow: SharedExecutor = Arc::new(FnExecutor::new(|_ctx: TaskContext| {
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Payload::new())
            }
            .boxed()
        }));
        let s = scheduler_with(slow, SchedulerConfig::default());
        let id = s
            .create_workflow(
                "slow",
                "",
                vec![TaskSpec::new("a", "A").timeout_ms(20).max_retries(1)],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Failed);
        let a = wf.task_by_key("a").unwrap();
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.retry_count, 1);
        assert!(a.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panicking_executor_is_contained() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let panicky: SharedExecutor = Arc::new(FnExecutor::new(move |_ctx: TaskContext| {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < u32::MAX {
                    panic!("executor bug");
                }
                Ok(Payload::new())
            }
            .boxed()
        }));
        let s = scheduler_with(panicky, SchedulerConfig::default());
        let id = s
            .create_workflow(
                "panic",
                "",
                vec![TaskSpec::new("a", "A").max_retries(1)],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(wf.tasks[0].error.as_deref().unwrap().contains("executor bug"));
    }

    #[tokio::test]
    async fn test_skippable_dependent_lets_workflow_complete() {
        let executor: SharedExecutor = Arc::new(FnExecutor::new(|ctx: TaskContext| {
            async move {
                if ctx.key == "optional" {
                    Err(ExecutorError::failed("nope"))
                } else {
                    Ok(Payload::new())
                }
            }
            .boxed()
        }));
        let s = scheduler_with(executor, SchedulerConfig::default());
        let id = s
            .create_workflow(
                "skip",
                "",
                vec![
                    TaskSpec::new("main", "Main"),
                    TaskSpec::new("optional", "Optional").max_retries(0).skippable(),
                    TaskSpec::new("polish", "Polish").depends_on("optional").skippable(),
                ],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.task_by_key("optional").unwrap().status, TaskStatus::Failed);
        assert_eq!(wf.task_by_key("polish").unwrap().status, TaskStatus::Skipped);
        // A failed task still fails the workflow; only dependents are skippable.
        assert_eq!(wf.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_blocking_cascades_transitively() {
        let executor: SharedExecutor = Arc::new(FnExecutor::new(|ctx: TaskContext| {
            async move {
                if ctx.key == "a" {
                    Err(ExecutorError::failed("a broke"))
                } else {
                    Ok(Payload::new())
                }
            }
            .boxed()
        }));
        let s = scheduler_with(executor, SchedulerConfig::default());
        let id = s
            .create_workflow(
                "cascade",
                "",
                vec![
                    TaskSpec::new("a", "A").max_retries(0),
                    TaskSpec::new("b", "B").depends_on("a"),
                    TaskSpec::new("c", "C").depends_on("b"),
                    TaskSpec::new("d", "D").depends_on("c").skippable(),
                ],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.task_by_key("b").unwrap().status, TaskStatus::Blocked);
        assert_eq!(wf.task_by_key("c").unwrap().status, TaskStatus::Blocked);
        assert_eq!(wf.task_by_key("d").unwrap().status, TaskStatus::Skipped);
        for key in ["b", "c", "d"] {
            assert!(wf.task_by_key(key).unwrap().started_at.is_none());
        }
    }

    #[tokio::test]
    async fn test_pause_resume_and_cancel() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let g = Arc::clone(&gate);
        let gated: SharedExecutor = Arc::new(FnExecutor::new(move |_ctx: TaskContext| {
            let g = Arc::clone(&g);
            async move {
                let permit = g.acquire().await.map_err(|e| ExecutorError::failed(e.to_string()))?;
                permit.forget();
                Ok(Payload::new())
            }
            .boxed()
        }));
        let config = SchedulerConfig {
            max_in_flight_tasks: 1,
            ..Default::default()
        };
        let s = scheduler_with(gated, config);
        let id = s
            .create_workflow(
                "pausable",
                "",
                vec![
                    TaskSpec::new("a", "A"),
                    TaskSpec::new("b", "B").depends_on("a"),
                ],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();

        assert!(s.pause_workflow(&id).await.is_err());
        s.start_workflow(&id).await.unwrap();
        s.pause_workflow(&id).await.unwrap();
        assert!(s.pause_workflow(&id).await.is_err());

        // a may already be running; let it finish while paused
        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let paused = s.get_workflow(&id).await.unwrap();
        assert_eq!(paused.status, WorkflowStatus::Paused);
        assert_ne!(paused.task_by_key("b").unwrap().status, TaskStatus::InProgress);

        s.resume_workflow(&id).await.unwrap();
        assert!(s.resume_workflow(&id).await.is_err());
        gate.add_permits(2);
        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);

        assert!(matches!(
            s.cancel_workflow(&id).await.unwrap_err(),
            CoordinationError::InvalidState { .. }
        ));

        let pending = s
            .create_workflow("never", "", vec![TaskSpec::new("a", "A")], Priority::Low, None)
            .await
            .unwrap();
        s.cancel_workflow(&pending).await.unwrap();
        let cancelled = s.get_workflow(&pending).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
        assert!(s.start_workflow(&pending).await.is_err());
    }

    #[tokio::test]
    async fn test_enforced_workflow_timeout_cancels() {
        let slow: SharedExecutor = Arc::new(FnExecutor::new(|_ctx: TaskContext| {
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Payload::new())
            }
            .boxed()
        }));
        let config = SchedulerConfig {
            enforce_workflow_timeout: true,
            poll_interval_ms: 10,
            ..Default::default()
        };
        let s = scheduler_with(slow, config);
        let id = s
            .create_workflow(
                "deadline",
                "",
                vec![
                    TaskSpec::new("a", "A").timeout_ms(5_000),
                    TaskSpec::new("b", "B").depends_on("a"),
                ],
                Priority::Medium,
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();

        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Cancelled);
        assert_eq!(wf.error.as_deref(), Some("timeout"));

        // the in-flight attempt still records its result, nothing new starts
        tokio::time::sleep(Duration::from_millis(300)).await;
        let wf = s.get_workflow(&id).await.unwrap();
        assert_eq!(wf.task_by_key("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(wf.task_by_key("b").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let s = scheduler();
        let id = s
            .create_workflow("idle", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
            .await
            .unwrap();
        let err = s.wait_for(&id, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, CoordinationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_agent_pair_default_executor() {
        let pairs = AgentPairRegistry::new().with(
            FnAgentPair::new("content", AgentRole::Content, |req| {
                let mut out = Payload::new();
                out.insert("draft".into(), json!(format!("draft for {}", req["description"])));
                Ok(out)
            })
            .shared(),
        );
        let s = WorkflowScheduler::new(
            SchedulerConfig::default(),
            ExecutorRegistry::with_agent_pairs(pairs),
            EventBus::new().shared(),
        );
        let id = s
            .create_workflow(
                "pair",
                "",
                vec![TaskSpec::new("a", "A")
                    .agent_pair("content")
                    .description("launch email")],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();
        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(
            wf.tasks[0].result.as_ref().unwrap()["draft"],
            json!("draft for \"launch email\"")
        );
    }

    #[tokio::test]
    async fn test_stats_and_shutdown() {
        let s = scheduler();
        let id = s
            .create_workflow("stats", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();
        s.wait_for(&id, WAIT).await.unwrap();

        let stats = s.stats().await;
        assert_eq!(stats.total_workflows, 1);
        assert_eq!(stats.active_workflows, 0);
        assert_eq!(stats.queued_tasks, 0);

        s.shutdown().await;
        let next = s
            .create_workflow("late", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
            .await
            .unwrap();
        assert!(matches!(
            s.start_workflow(&next).await.unwrap_err(),
            CoordinationError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn test_zero_limits_are_raised_to_one() {
        let config = SchedulerConfig {
            max_in_flight_tasks: 0,
            max_concurrent_workflows: 0,
            ..Default::default()
        };
        let s = scheduler_with(ok_executor(), config);
        assert_eq!(s.config().max_in_flight_tasks, 1);
        assert_eq!(s.config().max_concurrent_workflows, 1);

        let id = s
            .create_workflow(
                "starved",
                "",
                vec![TaskSpec::new("a", "A"), TaskSpec::new("b", "B").depends_on("a")],
                Priority::Medium,
                None,
            )
            .await
            .unwrap();
        s.start_workflow(&id).await.unwrap();
        let wf = s.wait_for(&id, WAIT).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
    }
}
