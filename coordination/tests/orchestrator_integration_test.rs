//! End-to-end orchestrator tests: configuration from disk, stub agent
//! pairs, mixed task kinds and knowledge-base persistence.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use content_council::events::HandlerError;
use content_council::knowledge::{KnowledgeBaseExt, RecordFilter};
use content_council::workflow::FnExecutor;
use content_council::{
    AgentRole, CoordinationConfig, EventType, FnAgentPair, InMemoryKnowledgeBase, KnowledgeBase, Orchestrator,
    Payload, RecordKind, SharedAgentPair, TaskContext, TaskSpec, TaskStatus, WorkflowStatus,
    WorkflowTemplate,
};
use futures::FutureExt;
use serde_json::{json, Value};

const WAIT: Duration = Duration::from_secs(10);

fn obj(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// Agrees at 0.9 and remembers the context of every proposal request
fn recording_pair(id: &str, role: AgentRole, contexts: Arc<Mutex<Vec<Value>>>) -> SharedAgentPair {
    FnAgentPair::new(id, role, move |req| {
        if req.get("turn").and_then(Value::as_str) == Some("proposal") {
            contexts.lock().unwrap().push(req["context"].clone());
        }
        Ok(obj(json!({
            "text": "Lead with customer stories on social channels",
            "agreement": 0.9,
        })))
    })
    .with_agents("planner", "critic")
    .shared()
}

#[tokio::test]
async fn test_config_file_drives_orchestrator() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[scheduler]
max_in_flight_tasks = 2
default_max_retries = 1

[debate]
max_rounds = 2
consensus_threshold = 0.85
"#
    )
    .unwrap();
    let config = CoordinationConfig::load(file.path()).unwrap();
    assert_eq!(config.debate.max_rounds, 2);

    let orch = Orchestrator::builder().config(config).build();
    assert_eq!(orch.scheduler().config().max_in_flight_tasks, 2);

    let id = orch
        .debates()
        .create_debate("Newsletter", "", "a", "b")
        .unwrap();
    let debate = orch.debates().get_debate(&id).unwrap();
    assert_eq!(debate.max_rounds, 2);
    assert!((debate.consensus_threshold - 0.85).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_mixed_pipeline_passes_results_into_debate() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let research_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&research_calls);
    let research = Arc::new(FnExecutor::new(move |ctx: TaskContext| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            let mut out = Payload::new();
            out.insert("finding".into(), json!(format!("{} done", ctx.key)));
            Ok(out)
        }
        .boxed()
    }));

    let kb = InMemoryKnowledgeBase::new().shared();
    let orch = Orchestrator::builder()
        .agent_pair(recording_pair("brand", AgentRole::Strategy, Arc::clone(&contexts)))
        .executor("research", research)
        .knowledge(Arc::clone(&kb))
        .build();

    let consensus = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&consensus);
    orch.event_bus().subscribe(EventType::ConsensusReached, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok::<(), HandlerError>(())
    });

    let template = WorkflowTemplate::new(
        "launch_brief",
        vec![
            TaskSpec::new("audience", "Audience research").kind("research"),
            TaskSpec::new("positioning", "Positioning")
                .kind("debate")
                .agent_pair("brand")
                .depends_on("audience"),
            TaskSpec::new("brief", "Write brief")
                .kind("research")
                .depends_on("positioning"),
        ],
    );
    orch.save_template(&template).await.unwrap();

    let mut input = Payload::new();
    input.insert("topic".into(), json!("Autumn launch"));
    let id = orch.run_pipeline("launch_brief", input).await.unwrap();
    let workflow = orch.await_workflow(&id, WAIT).await.unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert!(workflow
        .tasks
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
    assert_eq!(research_calls.load(Ordering::SeqCst), 2);
    assert_eq!(consensus.load(Ordering::SeqCst), 1);

    let contexts = contexts.lock().unwrap().clone();
    assert_eq!(contexts.len(), 1);
    assert_eq!(
        contexts[0]["dependencies"]["audience"]["finding"],
        json!("audience done")
    );
    assert_eq!(contexts[0]["input"]["topic"], json!("Autumn launch"));

    let debate_id = workflow.results()["positioning"]["debate_id"]
        .as_str()
        .unwrap()
        .to_string();
    let record: content_council::DebateRecord = kb
        .get_record(RecordKind::DebateRecord, &debate_id)
        .unwrap()
        .unwrap();
    assert!(record.reached_consensus());
    assert_eq!(record.primary_agent, "planner");
    assert_eq!(record.topic, "Positioning: Autumn launch");

    let stored: Vec<WorkflowTemplate> = kb
        .query_records(RecordKind::WorkflowTemplate, &RecordFilter::all())
        .unwrap();
    assert_eq!(stored.len(), 1);

    orch.shutdown().await;
}

#[tokio::test]
async fn test_persisted_events_land_in_knowledge_base() {
    let mut config = CoordinationConfig::default();
    config.events.persist_events = true;
    let kb = InMemoryKnowledgeBase::new().shared();
    let orch = Orchestrator::builder()
        .config(config)
        .knowledge(Arc::clone(&kb))
        .build();

    let id = orch
        .debates()
        .create_debate("Podcast", "", "host", "guest")
        .unwrap();
    orch.debates().terminate_debate(&id, "cancelled").unwrap();

    let events = kb.query(RecordKind::Event, &RecordFilter::all()).unwrap();
    assert_eq!(events.len(), 2);
}
