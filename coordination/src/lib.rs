//! Content Council coordination core
//!
//! Coordinates agent pairs that plan content marketing through structured
//! debate. The library provides:
//! - A workflow scheduler: dependency-ordered tasks, priority queue,
//!   bounded concurrency, retries and failure blocking
//! - A debate engine: turn-taking protocol between a primary and an
//!   adversary agent, scored for consensus each round
//! - An event bus carrying every lifecycle transition
//! - A knowledge base for debate history and workflow templates
//! - An orchestrator facade with the built-in `content_marketing` pipeline
//!
//! # Usage
//!
//! ```no_run
//! use content_council::{AgentRole, FnAgentPair, Orchestrator, Payload};
//! use std::time::Duration;
//!
//! # async fn demo() -> content_council::CoordinationResult<()> {
//! let orchestrator = Orchestrator::builder()
//!     .agent_pair(FnAgentPair::new("strategy", AgentRole::Strategy, |_| Ok(Payload::new())).shared())
//!     .build();
//! let id = orchestrator.run_pipeline("content_marketing", Payload::new()).await?;
//! let workflow = orchestrator.await_workflow(&id, Duration::from_secs(60)).await?;
//! println!("{}", workflow.status);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod debate;
pub mod error;
pub mod events;
pub mod knowledge;
pub mod orchestrator;
pub mod telemetry;
pub mod workflow;

pub use agents::{AgentError, AgentPair, AgentPairRegistry, AgentRole, FnAgentPair, Payload, SharedAgentPair};
pub use config::{CoordinationConfig, DebateConfig, EventBusConfig, SchedulerConfig};
pub use debate::{
    Argument, ArgumentType, ConsensusMetrics, Debate, DebateCheckpoint, DebateEngine,
    DebateSettings, DebateStatus, EvaluatorSet, Evidence,
};
pub use error::{CoordinationError, CoordinationResult, ErrorKind};
pub use events::{CoordinationEvent, EventBus, EventFilter, EventType, SharedEventBus};
pub use knowledge::{
    DebateRecord, InMemoryKnowledgeBase, KnowledgeBase, KnowledgeItem, RecordKind,
    SharedKnowledgeBase, WorkflowTemplate,
};
pub use orchestrator::{
    DebateDriver, DebateOutcome, DebateTaskExecutor, Orchestrator, OrchestratorBuilder,
};
pub use workflow::{
    ExecutorError, ExecutorRegistry, Priority, TaskContext, TaskExecutor, TaskSpec, TaskStatus,
    Workflow, WorkflowDefinition, WorkflowScheduler, WorkflowStatus,
};
