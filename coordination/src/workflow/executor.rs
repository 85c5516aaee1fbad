//! Task executor registry
//!
//! A flat `kind → executor` table with one fallback. New kinds are added by
//! registration; there is no executor hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use thiserror::Error;

use super::types::{TaskId, WorkflowId};
use crate::agents::{AgentError, AgentPairRegistry, Payload};

/// Shared reference to an executor
pub type SharedExecutor = Arc<dyn TaskExecutor>;

/// Errors raised by task executors; all of them count as a failed attempt
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Executor panicked: {0}")]
    Panicked(String),

    #[error("No agent pair registered as {0:?}")]
    UnknownAgentPair(String),

    #[error("Task names no agent pair and no default pair is configured")]
    NoAgentPair,
}

impl ExecutorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Read-only view of a task handed to its executor
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    pub key: String,
    pub name: String,
    pub description: String,
    pub kind: Option<String>,
    pub agent_pair: Option<String>,
    pub input: Payload,
    /// 1 for the first invocation
    pub attempt: u32,
    /// Results of every prerequisite, keyed by task key
    pub dependency_results: HashMap<String, Payload>,
}

impl TaskContext {
    /// Payload form sent to agent-pair collaborators
    pub fn to_payload(&self) -> Payload {
        let dependencies: Payload = self
            .dependency_results
            .iter()
            .map(|(k, v)| (k.clone(), Value::Object(v.clone())))
            .collect();

        let mut payload = Payload::new();
        payload.insert("workflow_id".into(), json!(self.workflow_id));
        payload.insert("task_id".into(), json!(self.task_id));
        payload.insert("task_key".into(), json!(self.key));
        payload.insert("task_name".into(), json!(self.name));
        payload.insert("description".into(), json!(self.description));
        payload.insert("attempt".into(), json!(self.attempt));
        payload.insert("input".into(), Value::Object(self.input.clone()));
        payload.insert("dependencies".into(), Value::Object(dependencies));
        payload
    }
}

/// Performs one task attempt
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: TaskContext) -> Result<Payload, ExecutorError>;
}

/// Executor backed by an async closure
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(TaskContext) -> BoxFuture<'static, Result<Payload, ExecutorError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> TaskExecutor for FnExecutor<F>
where
    F: Fn(TaskContext) -> BoxFuture<'static, Result<Payload, ExecutorError>> + Send + Sync,
{
    async fn execute(&self, ctx: TaskContext) -> Result<Payload, ExecutorError> {
        (self.f)(ctx).await
    }
}

/// Default executor: forwards the task to its agent pair verbatim
pub struct AgentPairExecutor {
    pairs: AgentPairRegistry,
    default_pair: Option<String>,
}

impl AgentPairExecutor {
    pub fn new(pairs: AgentPairRegistry) -> Self {
        Self {
            pairs,
            default_pair: None,
        }
    }

    /// Pair used for tasks that name none
    pub fn with_default_pair(mut self, pair_id: impl Into<String>) -> Self {
        self.default_pair = Some(pair_id.into());
        self
    }
}

#[async_trait]
impl TaskExecutor for AgentPairExecutor {
    async fn execute(&self, ctx: TaskContext) -> Result<Payload, ExecutorError> {
        let pair_id = ctx
            .agent_pair
            .as_deref()
            .or(self.default_pair.as_deref())
            .ok_or(ExecutorError::NoAgentPair)?;
        let pair = self
            .pairs
            .get(pair_id)
            .ok_or_else(|| ExecutorError::UnknownAgentPair(pair_id.to_string()))?;

        let mut request = ctx.to_payload();
        request.insert("mode".into(), json!("task"));
        Ok(pair.invoke(request).await?)
    }
}

/// Flat mapping from task kind to executor
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, SharedExecutor>,
    default: SharedExecutor,
    agent_pairs: AgentPairRegistry,
}

impl ExecutorRegistry {
    /// Registry whose fallback forwards tasks to `pairs`
    pub fn with_agent_pairs(pairs: AgentPairRegistry) -> Self {
        Self {
            executors: HashMap::new(),
            default: Arc::new(AgentPairExecutor::new(pairs.clone())),
            agent_pairs: pairs,
        }
    }

    /// Registry with an explicit fallback and no agent pairs
    pub fn with_default(default: SharedExecutor) -> Self {
        Self {
            executors: HashMap::new(),
            default,
            agent_pairs: AgentPairRegistry::new(),
        }
    }

    /// Replace the fallback executor
    pub fn set_default(&mut self, default: SharedExecutor) {
        self.default = default;
    }

    /// Bind a kind to an executor, returning the previous binding
    pub fn register(&mut self, kind: impl Into<String>, executor: SharedExecutor) -> Option<SharedExecutor> {
        self.executors.insert(kind.into(), executor)
    }

    pub fn with(mut self, kind: impl Into<String>, executor: SharedExecutor) -> Self {
        self.register(kind, executor);
        self
    }

    /// Executor for a kind; unregistered or missing kinds use the fallback
    pub fn resolve(&self, kind: Option<&str>) -> SharedExecutor {
        kind.and_then(|k| self.executors.get(k))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.executors.contains_key(kind)
    }

    pub fn agent_pairs(&self) -> &AgentPairRegistry {
        &self.agent_pairs
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.executors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_agent_pairs(AgentPairRegistry::new())
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .field("agent_pairs", &self.agent_pairs)
            .finish()
    }
}
