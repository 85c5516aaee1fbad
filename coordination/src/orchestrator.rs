//! Orchestrator facade
//!
//! Wires the scheduler, debate engine, event bus and knowledge base into one
//! handle, and adds the pieces that span them:
//!
//! - [`DebateDriver`]: runs a whole debate between the two agents of a pair
//! - [`DebateTaskExecutor`]: the `debate` task kind, so workflows can debate
//! - named pipelines built from [`WorkflowTemplate`]s, including the
//!   built-in `content_marketing` chain (strategy → marketing → content)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::agents::{AgentPairRegistry, AgentRole, Payload, SharedAgentPair};
use crate::config::CoordinationConfig;
use crate::debate::{
    Argument, ArgumentType, ConsensusMetrics, Debate, DebateCheckpoint, DebateEngine,
    DebateStatus, EvaluatorSet, Evidence, IntegrityStatus, SharedDebateEngine,
};
use crate::error::{CoordinationError, CoordinationResult};
use crate::events::{CoordinationEvent, EventBus, EventType, SharedEventBus};
use crate::knowledge::{
    put_with_retry, DebateRecord, InMemoryKnowledgeBase, KnowledgeBase, KnowledgeBaseExt, KnowledgeError,
    KnowledgeItem, RecordFilter, RecordKind, RetryPolicy, SharedKnowledgeBase, WorkflowTemplate,
};
use crate::workflow::{
    ExecutorError, ExecutorRegistry, Priority, SharedExecutor, TaskContext, TaskExecutor,
    TaskSpec, Workflow, WorkflowDefinition, WorkflowId, WorkflowScheduler,
};

/// Task kind handled by [`DebateTaskExecutor`]
pub const DEBATE_TASK_KIND: &str = "debate";

/// Name of the built-in pipeline
pub const CONTENT_MARKETING_PIPELINE: &str = "content_marketing";

// =============================================================================
// Debate driver
// =============================================================================

/// Final state of a driven debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub debate_id: String,
    pub topic: String,
    /// Outcome status; never `completed`
    pub status: DebateStatus,
    pub rounds: u32,
    pub metrics: Option<ConsensusMetrics>,
    /// Content of the last resolution, if any
    pub resolution: Option<Payload>,
    pub failure: Option<String>,
}

impl DebateOutcome {
    pub fn from_debate(debate: &Debate) -> Self {
        Self {
            debate_id: debate.id.clone(),
            topic: debate.topic.clone(),
            status: debate.final_status(),
            rounds: debate.rounds.len() as u32,
            metrics: debate.latest_metrics().cloned(),
            resolution: debate
                .arguments()
                .filter(|a| a.argument_type == ArgumentType::Resolution)
                .last()
                .map(|a| a.content.clone()),
            failure: debate.failure.clone(),
        }
    }

    pub fn reached_consensus(&self) -> bool {
        self.status == DebateStatus::ConsensusReached
    }

    /// Task result form
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("debate_id".into(), json!(self.debate_id));
        payload.insert("topic".into(), json!(self.topic));
        payload.insert("status".into(), json!(self.status));
        payload.insert("rounds".into(), json!(self.rounds));
        payload.insert(
            "agreement_score".into(),
            json!(self.metrics.as_ref().map(|m| m.agreement_score)),
        );
        payload.insert(
            "resolution".into(),
            self.resolution.clone().map_or(Value::Null, Value::Object),
        );
        payload
    }

    pub fn summary_line(&self) -> String {
        let agreement = self
            .metrics
            .as_ref()
            .map_or("n/a".to_string(), |m| format!("{:.2}", m.agreement_score));
        format!(
            "[{}] {} rounds | agreement={} | {}",
            self.status, self.rounds, agreement, self.topic
        )
    }
}

/// Runs complete debates by asking an agent pair for every turn.
///
/// Each round asks the primary for a proposal, the adversary for a challenge,
/// the primary for a defense, then the adversary to close. A closing reply
/// carrying `"argument_type": "counter"` is submitted as a counter and the
/// primary is asked for the resolution instead. The engine enforces the
/// protocol; the driver only relays.
pub struct DebateDriver {
    engine: SharedDebateEngine,
    knowledge: Option<SharedKnowledgeBase>,
    retry: RetryPolicy,
}

impl DebateDriver {
    pub fn new(engine: SharedDebateEngine) -> Self {
        Self {
            engine,
            knowledge: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Store a [`DebateRecord`] for every finished debate
    pub fn with_knowledge(mut self, knowledge: SharedKnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &SharedDebateEngine {
        &self.engine
    }

    /// Drive a new debate on `topic` to its outcome, then archive it.
    ///
    /// A failed round evaluation yields a `failed` outcome. An agent failure
    /// terminates the debate and is returned as an error.
    pub async fn run(
        &self,
        pair: &SharedAgentPair,
        topic: &str,
        context: &Payload,
    ) -> CoordinationResult<DebateOutcome> {
        let primary = pair.primary_agent_id().to_string();
        let adversary = pair.adversary_agent_id().to_string();
        let debate_id = self.engine.create_debate(
            topic,
            &format!("{} debate", pair.role()),
            &primary,
            &adversary,
        )?;
        let mut guard = UnfinishedDebate {
            engine: Arc::clone(&self.engine),
            debate_id: debate_id.clone(),
            armed: true,
        };
        self.engine.start_debate(&debate_id)?;
        info!(debate_id = %debate_id, pair = pair.id(), topic, "Driving debate");

        while self.engine.get_debate(&debate_id)?.status == DebateStatus::InProgress {
            let mut previous = None;
            for (turn, agent) in [
                (ArgumentType::Proposal, &primary),
                (ArgumentType::Challenge, &adversary),
                (ArgumentType::Defense, &primary),
            ] {
                let reply = self.ask(pair, &debate_id, turn, agent, context).await?;
                previous = Some(self.submit(&debate_id, agent, turn, reply, previous)?.id);
            }

            let reply = self
                .ask(pair, &debate_id, ArgumentType::Resolution, &adversary, context)
                .await?;
            if wants_counter(&reply) {
                let counter =
                    self.submit(&debate_id, &adversary, ArgumentType::Counter, reply, previous)?;
                let reply = self
                    .ask(pair, &debate_id, ArgumentType::Resolution, &primary, context)
                    .await?;
                self.resolve(&debate_id, &primary, reply, Some(counter.id))?;
            } else {
                self.resolve(&debate_id, &adversary, reply, previous)?;
            }
        }

        let outcome = DebateOutcome::from_debate(&self.engine.get_debate(&debate_id)?);
        guard.armed = false;
        self.engine.complete_debate(&debate_id)?;
        info!(debate_id = %debate_id, "{}", outcome.summary_line());

        self.record(&debate_id).await;
        Ok(outcome)
    }

    async fn ask(
        &self,
        pair: &SharedAgentPair,
        debate_id: &str,
        turn: ArgumentType,
        agent: &str,
        context: &Payload,
    ) -> CoordinationResult<Payload> {
        let debate = self.engine.get_debate(debate_id)?;
        let history: Vec<Value> = debate
            .rounds
            .iter()
            .flat_map(|round| {
                round.arguments.iter().map(move |a| {
                    json!({
                        "round": round.round_number,
                        "agent_id": a.agent_id,
                        "argument_type": a.argument_type,
                        "content": a.content,
                    })
                })
            })
            .collect();
        let side = if agent == debate.primary_agent_id {
            "primary"
        } else {
            "adversary"
        };

        let mut request = Payload::new();
        request.insert("mode".into(), json!("argue"));
        request.insert("debate_id".into(), json!(debate_id));
        request.insert("topic".into(), json!(debate.topic));
        request.insert("round".into(), json!(debate.current_round));
        request.insert("turn".into(), json!(turn));
        request.insert("agent".into(), json!(agent));
        request.insert("side".into(), json!(side));
        request.insert("pair_role".into(), json!(pair.role()));
        request.insert("context".into(), Value::Object(context.clone()));
        request.insert("history".into(), Value::Array(history));

        debug!(debate_id = %debate_id, agent, turn = %turn, "Requesting argument");
        let bus = self.engine.event_bus();
        let agent_event = |ty: EventType| {
            CoordinationEvent::debate(ty, debate_id)
                .with_round(debate.current_round)
                .with_agent(agent)
                .with_data("turn", turn.as_str())
        };
        bus.emit(agent_event(EventType::AgentTaskStarted));
        match pair.invoke(request).await {
            Ok(reply) => {
                bus.emit(agent_event(EventType::AgentTaskCompleted));
                Ok(reply)
            }
            Err(err) => {
                bus.emit(agent_event(EventType::AgentTaskFailed).with_data("error", err.to_string()));
                let reason = format!("agent {agent} failed during {turn}: {err}");
                if let Err(e) = self.engine.terminate_debate(debate_id, &reason) {
                    warn!(debate_id = %debate_id, error = %e, "Could not terminate debate");
                }
                Err(CoordinationError::execution(reason))
            }
        }
    }

    fn submit(
        &self,
        debate_id: &str,
        agent: &str,
        turn: ArgumentType,
        mut reply: Payload,
        previous: Option<String>,
    ) -> CoordinationResult<Argument> {
        let evidence = take_evidence(&mut reply);
        reply.remove("argument_type");
        self.engine.submit_argument(
            debate_id,
            agent,
            turn,
            reply,
            previous.into_iter().collect(),
            evidence,
        )
    }

    fn resolve(
        &self,
        debate_id: &str,
        agent: &str,
        reply: Payload,
        previous: Option<String>,
    ) -> CoordinationResult<()> {
        match self.submit(debate_id, agent, ArgumentType::Resolution, reply, previous) {
            Ok(_) => Ok(()),
            Err(err) => {
                // evaluation failures already moved the debate to failed
                if self.engine.get_debate(debate_id)?.status == DebateStatus::Failed {
                    warn!(debate_id = %debate_id, error = %err, "Round evaluation failed");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn record(&self, debate_id: &str) {
        let Some(knowledge) = &self.knowledge else {
            return;
        };
        let stored = match self.engine.get_debate(debate_id) {
            Ok(debate) => match serde_json::to_value(DebateRecord::from_debate(&debate)) {
                Ok(value) => {
                    put_with_retry(
                        knowledge.as_ref(),
                        RecordKind::DebateRecord,
                        debate_id,
                        value,
                        self.retry,
                    )
                    .await
                }
                Err(e) => Err(KnowledgeError::from(e)),
            },
            Err(e) => {
                warn!(debate_id = %debate_id, error = %e, "Debate vanished before recording");
                return;
            }
        };
        if let Err(e) = stored {
            warn!(debate_id = %debate_id, error = %e, "Failed to store debate record");
        }
    }
}

/// Terminates the debate if the driving future is dropped mid-debate, as
/// happens on a task timeout or a scheduler shutdown
struct UnfinishedDebate {
    engine: SharedDebateEngine,
    debate_id: String,
    armed: bool,
}

impl Drop for UnfinishedDebate {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let live = matches!(
            self.engine.get_debate(&self.debate_id).map(|d| d.status),
            Ok(DebateStatus::Pending | DebateStatus::InProgress)
        );
        if !live {
            return;
        }
        match self.engine.terminate_debate(&self.debate_id, "driver cancelled") {
            Ok(()) => warn!(debate_id = %self.debate_id, "Driver dropped mid-debate; debate terminated"),
            Err(e) => warn!(debate_id = %self.debate_id, error = %e, "Could not terminate abandoned debate"),
        }
    }
}

fn wants_counter(reply: &Payload) -> bool {
    reply.get("argument_type").and_then(Value::as_str) == Some("counter")
}

/// Pull well-formed evidence items out of an agent reply
fn take_evidence(reply: &mut Payload) -> Vec<Evidence> {
    let Some(Value::Array(items)) = reply.remove("evidence") else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Evidence>(item) {
            Ok(evidence) => Some(evidence),
            Err(e) => {
                warn!(error = %e, "Dropping malformed evidence");
                None
            }
        })
        .collect()
}

// =============================================================================
// Debate task kind
// =============================================================================

/// Executor for `debate` tasks.
///
/// The pair is the task's `agent_pair`, else the first pair registered for
/// the role named by the `role` input. The topic is the task name, suffixed
/// with the `topic` input when present. Anything short of consensus fails
/// the attempt.
pub struct DebateTaskExecutor {
    driver: Arc<DebateDriver>,
    pairs: AgentPairRegistry,
}

impl DebateTaskExecutor {
    pub fn new(driver: Arc<DebateDriver>, pairs: AgentPairRegistry) -> Self {
        Self { driver, pairs }
    }

    fn pair_for(&self, ctx: &TaskContext) -> Result<SharedAgentPair, ExecutorError> {
        if let Some(id) = &ctx.agent_pair {
            return self
                .pairs
                .get(id)
                .ok_or_else(|| ExecutorError::UnknownAgentPair(id.clone()));
        }
        let Some(role) = ctx.input.get("role").and_then(Value::as_str) else {
            return Err(ExecutorError::NoAgentPair);
        };
        let role: AgentRole = role.parse().map_err(ExecutorError::Failed)?;
        self.pairs
            .by_role(role)
            .ok_or_else(|| ExecutorError::UnknownAgentPair(format!("role {role}")))
    }
}

#[async_trait]
impl TaskExecutor for DebateTaskExecutor {
    async fn execute(&self, ctx: TaskContext) -> Result<Payload, ExecutorError> {
        let pair = self.pair_for(&ctx)?;
        let topic = match ctx.input.get("topic").and_then(Value::as_str) {
            Some(topic) => format!("{}: {}", ctx.name, topic),
            None => ctx.name.clone(),
        };

        let outcome = self
            .driver
            .run(&pair, &topic, &ctx.to_payload())
            .await
            .map_err(|e| ExecutorError::failed(e.to_string()))?;
        if !outcome.reached_consensus() {
            return Err(ExecutorError::failed(format!(
                "debate {} ended {}",
                outcome.debate_id, outcome.status
            )));
        }
        Ok(outcome.to_payload())
    }
}

// =============================================================================
// Pipelines
// =============================================================================

/// The built-in strategy → marketing → content debate chain
pub fn content_marketing_pipeline() -> WorkflowTemplate {
    let stage = |key: &str, name: &str, role: AgentRole| {
        TaskSpec::new(key, name)
            .kind(DEBATE_TASK_KIND)
            .input("role", role.as_str())
    };
    WorkflowTemplate::new(
        CONTENT_MARKETING_PIPELINE,
        vec![
            stage("strategy", "Content strategy", AgentRole::Strategy)
                .description("Agree on objectives, audience and positioning")
                .priority(Priority::High),
            stage("marketing", "Marketing plan", AgentRole::Marketing)
                .description("Turn the strategy into channels, budget and timeline")
                .depends_on("strategy"),
            stage("content", "Content plan", AgentRole::Content)
                .description("Decide the pieces to produce and their messaging")
                .depends_on("marketing"),
        ],
    )
    .with_description("Strategy, marketing and content debates, each building on the last")
    .with_category("content_marketing")
}

/// Turn a template into a definition; `input` fills keys tasks leave unset
fn instantiate(template: &WorkflowTemplate, input: &Payload) -> WorkflowDefinition {
    let tasks = template
        .tasks
        .iter()
        .cloned()
        .map(|mut spec| {
            for (key, value) in input {
                spec.input.entry(key.clone()).or_insert_with(|| value.clone());
            }
            spec
        })
        .collect();

    let mut definition = WorkflowDefinition::new(template.name.clone(), tasks)
        .with_description(template.description.clone())
        .with_priority(template.priority)
        .with_metadata("template_id", template.template_id.clone())
        .with_metadata("usage_count", template.usage_count);
    if let Some(ms) = template.timeout_ms {
        definition = definition.with_timeout(Duration::from_millis(ms));
    }
    definition
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: CoordinationConfig,
    pairs: AgentPairRegistry,
    knowledge: Option<SharedKnowledgeBase>,
    evaluators: EvaluatorSet,
    executors: Vec<(String, SharedExecutor)>,
    retry: RetryPolicy,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: CoordinationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn agent_pair(mut self, pair: SharedAgentPair) -> Self {
        self.pairs.register(pair);
        self
    }

    pub fn agent_pairs(mut self, pairs: AgentPairRegistry) -> Self {
        self.pairs = pairs;
        self
    }

    /// Defaults to a fresh in-memory store
    pub fn knowledge(mut self, knowledge: SharedKnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn evaluators(mut self, evaluators: EvaluatorSet) -> Self {
        self.evaluators = evaluators;
        self
    }

    /// Register an extra task kind
    pub fn executor(mut self, kind: impl Into<String>, executor: SharedExecutor) -> Self {
        self.executors.push((kind.into(), executor));
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Orchestrator {
        let knowledge = self
            .knowledge
            .unwrap_or_else(|| InMemoryKnowledgeBase::new().shared());
        let event_store = self
            .config
            .events
            .persist_events
            .then(|| Arc::clone(&knowledge));
        let bus = EventBus::from_config(&self.config.events, event_store).shared();

        let debates = DebateEngine::new(
            self.config.debate.clone(),
            self.evaluators,
            Arc::clone(&bus),
        )
        .shared();
        let driver = Arc::new(
            DebateDriver::new(Arc::clone(&debates))
                .with_knowledge(Arc::clone(&knowledge))
                .with_retry_policy(self.retry),
        );

        let mut registry = ExecutorRegistry::with_agent_pairs(self.pairs.clone()).with(
            DEBATE_TASK_KIND,
            Arc::new(DebateTaskExecutor::new(
                Arc::clone(&driver),
                self.pairs.clone(),
            )),
        );
        for (kind, executor) in self.executors {
            registry.register(kind, executor);
        }
        let scheduler =
            WorkflowScheduler::new(self.config.scheduler.clone(), registry, Arc::clone(&bus));

        let mut pipelines = HashMap::new();
        let builtin = content_marketing_pipeline();
        pipelines.insert(builtin.name.clone(), builtin);

        Orchestrator {
            config: self.config,
            bus,
            knowledge,
            pairs: self.pairs,
            scheduler,
            debates,
            driver,
            pipelines: RwLock::new(pipelines),
            retry: self.retry,
        }
    }
}

/// Single entry point over the whole coordination core
pub struct Orchestrator {
    config: CoordinationConfig,
    bus: SharedEventBus,
    knowledge: SharedKnowledgeBase,
    pairs: AgentPairRegistry,
    scheduler: WorkflowScheduler,
    debates: SharedDebateEngine,
    driver: Arc<DebateDriver>,
    pipelines: RwLock<HashMap<String, WorkflowTemplate>>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder {
            config: CoordinationConfig::default(),
            pairs: AgentPairRegistry::new(),
            knowledge: None,
            evaluators: EvaluatorSet::standard(),
            executors: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &WorkflowScheduler {
        &self.scheduler
    }

    pub fn debates(&self) -> &SharedDebateEngine {
        &self.debates
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn knowledge(&self) -> &SharedKnowledgeBase {
        &self.knowledge
    }

    pub fn agent_pairs(&self) -> &AgentPairRegistry {
        &self.pairs
    }

    // ── Pipelines ──────────────────────────────────────────────────────────

    /// Register (or replace) a named pipeline
    pub fn register_pipeline(&self, template: WorkflowTemplate) -> CoordinationResult<()> {
        if template.tasks.is_empty() {
            return Err(CoordinationError::invalid_argument(format!(
                "pipeline {} has no tasks",
                template.name
            )));
        }
        info!(pipeline = %template.name, tasks = template.tasks.len(), "Pipeline registered");
        self.pipelines
            .write()?
            .insert(template.name.clone(), template);
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> CoordinationResult<WorkflowTemplate> {
        self.pipelines
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| CoordinationError::not_found("pipeline", name))
    }

    pub fn pipeline_names(&self) -> CoordinationResult<Vec<String>> {
        let mut names: Vec<_> = self.pipelines.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Create and start a workflow from a named pipeline.
    ///
    /// `input` is merged into every task's input without overriding keys
    /// the template sets. The use is counted only once the workflow has
    /// started; a workflow that fails to start is cancelled.
    pub async fn run_pipeline(&self, name: &str, input: Payload) -> CoordinationResult<WorkflowId> {
        let template = self.pipeline(name)?;
        let workflow_id = self
            .scheduler
            .create_from(instantiate(&template, &input))
            .await?;
        if let Err(err) = self.scheduler.start_workflow(&workflow_id).await {
            if let Err(e) = self.scheduler.cancel_workflow(&workflow_id).await {
                warn!(workflow_id = %workflow_id, error = %e, "Could not cancel unstarted workflow");
            }
            return Err(err);
        }
        info!(pipeline = name, workflow_id = %workflow_id, "Pipeline started");

        let used = {
            let mut pipelines = self.pipelines.write()?;
            pipelines.get_mut(name).map(|template| {
                template.record_use();
                template.clone()
            })
        };
        if let Some(used) = used {
            self.store_usage(&used).await;
        }
        Ok(workflow_id)
    }

    /// Refresh the stored copy of a template after a use, if one is stored
    async fn store_usage(&self, template: &WorkflowTemplate) {
        match self.knowledge.get(RecordKind::WorkflowTemplate, &template.name) {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                warn!(template = %template.name, error = %e, "Could not read stored template");
                return;
            }
        }
        let stored = match serde_json::to_value(template) {
            Ok(value) => {
                put_with_retry(
                    self.knowledge.as_ref(),
                    RecordKind::WorkflowTemplate,
                    &template.name,
                    value,
                    self.retry,
                )
                .await
            }
            Err(e) => Err(KnowledgeError::from(e)),
        };
        if let Err(e) = stored {
            warn!(template = %template.name, error = %e, "Failed to store template usage");
        }
    }

    /// Wait until a workflow reaches a terminal status
    pub async fn await_workflow(&self, workflow_id: &str, timeout: Duration) -> CoordinationResult<Workflow> {
        self.scheduler.wait_for(workflow_id, timeout).await
    }

    /// Persist a template under its name and register it as a pipeline
    pub async fn save_template(&self, template: &WorkflowTemplate) -> CoordinationResult<()> {
        let value = serde_json::to_value(template).map_err(KnowledgeError::from)?;
        put_with_retry(
            self.knowledge.as_ref(),
            RecordKind::WorkflowTemplate,
            &template.name,
            value,
            self.retry,
        )
        .await?;
        self.register_pipeline(template.clone())
    }

    /// Load a stored template and register it as a pipeline.
    ///
    /// Uses are counted by [`Orchestrator::run_pipeline`], not here.
    pub async fn load_template(&self, name: &str) -> CoordinationResult<WorkflowTemplate> {
        let template: WorkflowTemplate = self
            .knowledge
            .get_record(RecordKind::WorkflowTemplate, name)?
            .ok_or_else(|| CoordinationError::not_found("template", name))?;
        self.register_pipeline(template.clone())?;
        Ok(template)
    }

    // ── Debates ────────────────────────────────────────────────────────────

    /// Drive a debate between the agents of a registered pair
    pub async fn run_debate(
        &self,
        pair_id: &str,
        topic: &str,
        context: Payload,
    ) -> CoordinationResult<DebateOutcome> {
        let pair = self.pairs.get(pair_id).ok_or_else(|| {
            CoordinationError::invalid_argument(format!("unknown agent pair {pair_id}"))
        })?;
        self.driver.run(&pair, topic, &context).await
    }

    /// Stored records of finished debates
    pub fn debate_records(&self) -> CoordinationResult<Vec<DebateRecord>> {
        Ok(self
            .knowledge
            .query_records(RecordKind::DebateRecord, &RecordFilter::all())?)
    }

    /// Store a shared knowledge item, replacing earlier versions
    pub async fn put_knowledge(&self, item: &KnowledgeItem) -> CoordinationResult<()> {
        let value = serde_json::to_value(item).map_err(KnowledgeError::from)?;
        put_with_retry(
            self.knowledge.as_ref(),
            RecordKind::KnowledgeItem,
            &item.item_id,
            value,
            self.retry,
        )
        .await?;
        Ok(())
    }

    /// Shared knowledge items of one category
    pub fn knowledge_items(&self, category: &str) -> CoordinationResult<Vec<KnowledgeItem>> {
        Ok(self.knowledge.query_records(
            RecordKind::KnowledgeItem,
            &RecordFilter::all().eq("category", category),
        )?)
    }

    /// Checkpoint a debate into the knowledge base
    pub async fn checkpoint_debate(&self, debate_id: &str, reason: &str) -> CoordinationResult<u64> {
        let checkpoint = self.debates.checkpoint(debate_id, reason)?;
        let value = serde_json::to_value(&checkpoint).map_err(KnowledgeError::from)?;
        put_with_retry(
            self.knowledge.as_ref(),
            RecordKind::Checkpoint,
            debate_id,
            value,
            self.retry,
        )
        .await?;
        Ok(checkpoint.sequence)
    }

    /// Re-import a checkpointed debate into the engine
    pub fn restore_debate(&self, debate_id: &str) -> CoordinationResult<IntegrityStatus> {
        let checkpoint: DebateCheckpoint = self
            .knowledge
            .get_record(RecordKind::Checkpoint, debate_id)?
            .ok_or_else(|| CoordinationError::not_found("checkpoint", debate_id))?;
        self.debates
            .restore(checkpoint)
            .map_err(|e| CoordinationError::invalid_argument(e.to_string()))
    }

    /// Stop the scheduler loop
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("agent_pairs", &self.pairs)
            .field("debates", &self.debates)
            .finish()
    }
}
