//! Event types for workflow and debate coordination
//!
//! Every lifecycle transition in the scheduler and debate engine produces
//! one [`CoordinationEvent`]. Subscribers only ever see clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::Payload;

/// Unique identifier for events
pub type EventId = String;

/// All lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepRetrying,
    StepBlocked,
    StepSkipped,
    DebateCreated,
    DebateStarted,
    RoundStarted,
    ArgumentSubmitted,
    RoundCompleted,
    ConsensusReached,
    DebateDeadlocked,
    DebateTerminated,
    DebateFailed,
    DebateCompleted,
    AgentTaskStarted,
    AgentTaskCompleted,
    AgentTaskFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowPaused => "workflow_paused",
            Self::WorkflowResumed => "workflow_resumed",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::StepRetrying => "step_retrying",
            Self::StepBlocked => "step_blocked",
            Self::StepSkipped => "step_skipped",
            Self::DebateCreated => "debate_created",
            Self::DebateStarted => "debate_started",
            Self::RoundStarted => "round_started",
            Self::ArgumentSubmitted => "argument_submitted",
            Self::RoundCompleted => "round_completed",
            Self::ConsensusReached => "consensus_reached",
            Self::DebateDeadlocked => "debate_deadlocked",
            Self::DebateTerminated => "debate_terminated",
            Self::DebateFailed => "debate_failed",
            Self::DebateCompleted => "debate_completed",
            Self::AgentTaskStarted => "agent_task_started",
            Self::AgentTaskCompleted => "agent_task_completed",
            Self::AgentTaskFailed => "agent_task_failed",
        }
    }

    /// Workflow-level event that ends the workflow
    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted | Self::WorkflowFailed | Self::WorkflowCancelled
        )
    }

    pub fn is_workflow_event(&self) -> bool {
        self.as_str().starts_with("workflow_") || self.as_str().starts_with("step_")
    }

    pub fn is_debate_event(&self) -> bool {
        matches!(
            self,
            Self::DebateCreated
                | Self::DebateStarted
                | Self::RoundStarted
                | Self::ArgumentSubmitted
                | Self::RoundCompleted
                | Self::ConsensusReached
                | Self::DebateDeadlocked
                | Self::DebateTerminated
                | Self::DebateFailed
                | Self::DebateCompleted
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A lifecycle notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinationEvent {
    pub event_id: EventId,
    /// Assigned by the bus on emit; monotonically increasing per bus
    #[serde(default)]
    pub sequence: u64,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Payload,
}

impl CoordinationEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_id: Self::new_id(),
            sequence: 0,
            event_type,
            workflow_id: None,
            debate_id: None,
            task_id: None,
            round: None,
            agent_id: None,
            timestamp: Utc::now(),
            data: Payload::new(),
        }
    }

    /// Event scoped to a workflow
    pub fn workflow(event_type: EventType, workflow_id: impl Into<String>) -> Self {
        let mut event = Self::new(event_type);
        event.workflow_id = Some(workflow_id.into());
        event
    }

    /// Event scoped to one task of a workflow
    pub fn step(
        event_type: EventType,
        workflow_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self::workflow(event_type, workflow_id).with_task(task_id)
    }

    /// Event scoped to a debate
    pub fn debate(event_type: EventType, debate_id: impl Into<String>) -> Self {
        let mut event = Self::new(event_type);
        event.debate_id = Some(debate_id.into());
        event
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Generate a new event ID
    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}
