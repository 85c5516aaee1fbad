//! Record types persisted by the coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::Payload;
use crate::debate::consensus::ConsensusMetrics;
use crate::debate::state::{ArgumentType, Debate, DebateStatus};
use crate::workflow::types::{Priority, TaskSpec};

/// Summary of a finished debate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateRecord {
    pub debate_id: String,
    pub topic: String,
    pub primary_agent: String,
    pub adversary_agent: String,
    pub proposals: Vec<Payload>,
    pub challenges: Vec<Payload>,
    pub resolutions: Vec<Payload>,
    pub final_status: DebateStatus,
    pub final_metrics: Option<ConsensusMetrics>,
    pub rounds: u32,
    pub recorded_at: DateTime<Utc>,
}

impl DebateRecord {
    pub fn from_debate(debate: &Debate) -> Self {
        let of_type = |wanted: ArgumentType| -> Vec<Payload> {
            debate
                .rounds
                .iter()
                .flat_map(|r| r.arguments.iter())
                .filter(|a| a.argument_type == wanted)
                .map(|a| a.content.clone())
                .collect()
        };

        Self {
            debate_id: debate.id.clone(),
            topic: debate.topic.clone(),
            primary_agent: debate.primary_agent_id.clone(),
            adversary_agent: debate.adversary_agent_id.clone(),
            proposals: of_type(ArgumentType::Proposal),
            challenges: of_type(ArgumentType::Challenge),
            resolutions: of_type(ArgumentType::Resolution),
            final_status: debate.final_status(),
            final_metrics: debate.latest_metrics().cloned(),
            rounds: debate.rounds.len() as u32,
            recorded_at: Utc::now(),
        }
    }

    pub fn reached_consensus(&self) -> bool {
        self.final_status == DebateStatus::ConsensusReached
    }
}

/// Reusable workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTemplate {
    pub template_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Payload,
}

impl WorkflowTemplate {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            template_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            tasks,
            priority: Priority::default(),
            timeout_ms: None,
            usage_count: 0,
            last_used: None,
            metadata: Payload::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Count one instantiation
    pub fn record_use(&mut self) {
        self.usage_count += 1;
        self.last_used = Some(Utc::now());
    }
}

/// Versioned piece of shared knowledge (brand voice, audience notes, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeItem {
    pub item_id: String,
    pub category: String,
    pub content: Value,
    pub source: String,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Payload,
}

impl KnowledgeItem {
    pub fn new(category: impl Into<String>, content: Value, source: impl Into<String>) -> Self {
        Self {
            item_id: uuid::Uuid::new_v4().to_string(),
            category: category.into(),
            content,
            source: source.into(),
            version: 1,
            timestamp: Utc::now(),
            metadata: Payload::new(),
        }
    }

    /// Replace the content and bump the version
    pub fn revise(&mut self, content: Value) {
        self.content = content;
        self.version += 1;
        self.timestamp = Utc::now();
    }
}
