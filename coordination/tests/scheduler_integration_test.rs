//! Scheduler integration tests: full workflows through the public API with
//! deterministic in-process executors.
//!
//! Covers dependency ordering, priority dispatch, the retry bound, blocked
//! propagation, workflow admission and the exact event sequence of a
//! two-step workflow.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use content_council::events::EventBus;
use content_council::workflow::{FnExecutor, SharedExecutor};
use content_council::{
    CoordinationError, CoordinationEvent, EventType, ExecutorError, ExecutorRegistry, Payload,
    Priority, SchedulerConfig, SharedEventBus, TaskContext, TaskSpec, TaskStatus, Workflow,
    WorkflowScheduler, WorkflowStatus,
};
use futures::FutureExt;
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

fn echo_executor() -> SharedExecutor {
    Arc::new(FnExecutor::new(|ctx: TaskContext| {
        async move {
            let mut out = Payload::new();
            out.insert("key".into(), json!(ctx.key));
            Ok(out)
        }
        .boxed()
    }))
}

fn failing_executor(calls: Arc<AtomicU32>) -> SharedExecutor {
    Arc::new(FnExecutor::new(move |_ctx: TaskContext| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExecutorError::failed("copywriter unavailable"))
        }
        .boxed()
    }))
}

fn setup(registry: ExecutorRegistry, config: SchedulerConfig) -> (WorkflowScheduler, SharedEventBus) {
    let bus = EventBus::new().shared();
    (WorkflowScheduler::new(config, registry, Arc::clone(&bus)), bus)
}

/// Events of one workflow as `(type, task key)` pairs, in emission order
fn timeline(bus: &SharedEventBus, workflow: &Workflow) -> Vec<(EventType, Option<String>)> {
    let key_of = |event: &CoordinationEvent| {
        event
            .task_id
            .as_deref()
            .and_then(|id| workflow.task(id))
            .map(|t| t.key.clone())
    };
    bus.retained()
        .iter()
        .filter(|e| e.workflow_id.as_deref() == Some(workflow.id.as_str()))
        .map(|e| (e.event_type, key_of(e)))
        .collect()
}

fn position(events: &[(EventType, Option<String>)], ty: EventType, key: &str) -> usize {
    events
        .iter()
        .position(|(t, k)| *t == ty && k.as_deref() == Some(key))
        .unwrap_or_else(|| panic!("no {ty:?} for {key}"))
}

// ── Dependency ordering ────────────────────────────────────────────

#[tokio::test]
async fn test_dependents_start_after_prerequisite_completes() {
    let (scheduler, bus) = setup(
        ExecutorRegistry::with_default(echo_executor()),
        SchedulerConfig::default(),
    );
    let id = scheduler
        .create_workflow(
            "launch",
            "",
            vec![
                TaskSpec::new("a", "Research"),
                TaskSpec::new("b", "Outline").depends_on("a"),
                TaskSpec::new("c", "Brief").depends_on("a"),
            ],
            Priority::Medium,
            None,
        )
        .await
        .unwrap();
    scheduler.start_workflow(&id).await.unwrap();
    let workflow = scheduler.wait_for(&id, WAIT).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);

    let events = timeline(&bus, &workflow);
    let a_done = position(&events, EventType::StepCompleted, "a");
    assert!(position(&events, EventType::StepStarted, "a") < a_done);
    assert!(a_done < position(&events, EventType::StepStarted, "b"));
    assert!(a_done < position(&events, EventType::StepStarted, "c"));

    let results = workflow.results();
    assert_eq!(results["b"]["key"], json!("b"));
}

// ── Priority ordering ──────────────────────────────────────────────

#[tokio::test]
async fn test_critical_task_dispatches_before_earlier_low_task() {
    let config = SchedulerConfig {
        max_in_flight_tasks: 1,
        ..Default::default()
    };
    let (scheduler, bus) = setup(ExecutorRegistry::with_default(echo_executor()), config);
    let id = scheduler
        .create_workflow(
            "prioritised",
            "",
            vec![
                TaskSpec::new("low", "Low").priority(Priority::Low),
                TaskSpec::new("critical", "Critical").priority(Priority::Critical),
            ],
            Priority::Medium,
            None,
        )
        .await
        .unwrap();
    scheduler.start_workflow(&id).await.unwrap();
    let workflow = scheduler.wait_for(&id, WAIT).await.unwrap();

    let events = timeline(&bus, &workflow);
    assert!(
        position(&events, EventType::StepCompleted, "critical")
            < position(&events, EventType::StepStarted, "low")
    );
}

// ── Retry bound ────────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_task_attempted_max_retries_plus_one() {
    let calls = Arc::new(AtomicU32::new(0));
    let (scheduler, bus) = setup(
        ExecutorRegistry::with_default(failing_executor(Arc::clone(&calls))),
        SchedulerConfig::default(),
    );
    let id = scheduler
        .create_workflow(
            "retry",
            "",
            vec![TaskSpec::new("a", "Draft").max_retries(2)],
            Priority::Medium,
            None,
        )
        .await
        .unwrap();
    scheduler.start_workflow(&id).await.unwrap();
    let workflow = scheduler.wait_for(&id, WAIT).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    let task = workflow.task_by_key("a").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 2);
    assert!(task.error.as_deref().unwrap().contains("copywriter unavailable"));

    let retries = timeline(&bus, &workflow)
        .iter()
        .filter(|(t, _)| *t == EventType::StepRetrying)
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn test_retry_backoff_delays_each_reattempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let config = SchedulerConfig {
        retry_backoff_ms: 80,
        ..Default::default()
    };
    let (scheduler, _bus) = setup(
        ExecutorRegistry::with_default(failing_executor(Arc::clone(&calls))),
        config,
    );
    let id = scheduler
        .create_workflow(
            "backoff",
            "",
            vec![TaskSpec::new("a", "Draft").max_retries(2)],
            Priority::Medium,
            None,
        )
        .await
        .unwrap();

    let started = Instant::now();
    scheduler.start_workflow(&id).await.unwrap();
    let workflow = scheduler.wait_for(&id, WAIT).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(
        elapsed >= Duration::from_millis(160),
        "two backoffs of 80ms should take at least 160ms, took {elapsed:?}"
    );
}

// ── Blocked propagation ────────────────────────────────────────────

#[tokio::test]
async fn test_dependent_of_failed_task_is_blocked() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = ExecutorRegistry::with_default(echo_executor())
        .with("flaky", failing_executor(Arc::clone(&calls)));
    let (scheduler, bus) = setup(registry, SchedulerConfig::default());
    let id = scheduler
        .create_workflow(
            "blocked",
            "",
            vec![
                TaskSpec::new("a", "Publish").kind("flaky").max_retries(1),
                TaskSpec::new("b", "Promote").depends_on("a"),
                TaskSpec::new("c", "Report").depends_on("b"),
            ],
            Priority::Medium,
            None,
        )
        .await
        .unwrap();
    scheduler.start_workflow(&id).await.unwrap();
    let workflow = scheduler.wait_for(&id, WAIT).await.unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(workflow.task_by_key("a").unwrap().status, TaskStatus::Failed);
    assert_eq!(workflow.task_by_key("b").unwrap().status, TaskStatus::Blocked);
    assert_eq!(workflow.task_by_key("c").unwrap().status, TaskStatus::Blocked);

    let events = timeline(&bus, &workflow);
    assert!(!events
        .iter()
        .any(|(t, k)| *t == EventType::StepStarted && k.as_deref() != Some("a")));
    assert!(events.contains(&(EventType::StepBlocked, Some("b".to_string()))));
}

// ── Admission ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_workflow_ceiling() {
    let slow: SharedExecutor = Arc::new(FnExecutor::new(|_ctx: TaskContext| {
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Payload::new())
        }
        .boxed()
    }));
    let config = SchedulerConfig {
        max_concurrent_workflows: 1,
        ..Default::default()
    };
    let (scheduler, _bus) = setup(ExecutorRegistry::with_default(slow), config);

    let first = scheduler
        .create_workflow("one", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
        .await
        .unwrap();
    let second = scheduler
        .create_workflow("two", "", vec![TaskSpec::new("a", "A")], Priority::Medium, None)
        .await
        .unwrap();
    scheduler.start_workflow(&first).await.unwrap();

    let err = scheduler.start_workflow(&second).await.unwrap_err();
    assert!(matches!(err, CoordinationError::ResourceExhausted { .. }));
    assert!(err.is_retryable());
    assert_eq!(
        scheduler.get_workflow(&second).await.unwrap().status,
        WorkflowStatus::Pending
    );

    scheduler.wait_for(&first, WAIT).await.unwrap();
    scheduler.start_workflow(&second).await.unwrap();
    let done = scheduler.wait_for(&second, WAIT).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
}

// ── Event completeness ─────────────────────────────────────────────

#[tokio::test]
async fn test_two_task_workflow_event_sequence() {
    let (scheduler, bus) = setup(
        ExecutorRegistry::with_default(echo_executor()),
        SchedulerConfig::default(),
    );
    let id = scheduler
        .create_workflow(
            "pair",
            "",
            vec![
                TaskSpec::new("a", "Draft"),
                TaskSpec::new("b", "Edit").depends_on("a"),
            ],
            Priority::Medium,
            None,
        )
        .await
        .unwrap();
    scheduler.start_workflow(&id).await.unwrap();
    let workflow = scheduler.wait_for(&id, WAIT).await.unwrap();

    let a = Some("a".to_string());
    let b = Some("b".to_string());
    assert_eq!(
        timeline(&bus, &workflow),
        vec![
            (EventType::WorkflowStarted, None),
            (EventType::StepStarted, a.clone()),
            (EventType::StepCompleted, a),
            (EventType::StepStarted, b.clone()),
            (EventType::StepCompleted, b),
            (EventType::WorkflowCompleted, None),
        ]
    );
}
