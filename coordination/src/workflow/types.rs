//! Workflow and task data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::Payload;

/// Unique identifier for workflows
pub type WorkflowId = String;

/// Unique identifier for tasks
pub type TaskId = String;

/// Dispatch priority; higher variants dispatch first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Task lifecycle
///
/// ```text
/// pending → ready → in_progress → completed
///    ▲                  │
///    └──── (retry) ─────┤
///                       ├──→ failed
/// pending ──────────────┴──→ blocked | skipped   (prerequisite failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Blocked | Self::Skipped
        )
    }

    /// Terminal without having produced a result
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed | Self::Blocked | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Workflow lifecycle; `paused` is only reachable from `in_progress`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Counts against the concurrent-workflow ceiling
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Caller-supplied task definition.
///
/// `dependencies` name other specs of the same workflow by `key`.
/// Unset `priority`, `timeout_ms` and `max_retries` inherit from the
/// workflow and scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub agent_pair: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub skippable: bool,
    #[serde(default)]
    pub input: Payload,
}

impl TaskSpec {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            kind: None,
            agent_pair: None,
            priority: None,
            dependencies: Vec::new(),
            timeout_ms: None,
            max_retries: None,
            skippable: false,
            input: Payload::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn agent_pair(mut self, pair_id: impl Into<String>) -> Self {
        self.agent_pair = Some(pair_id.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.dependencies.push(key.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }
}

/// A schedulable unit of work owned by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    pub key: String,
    pub name: String,
    pub description: String,
    pub kind: Option<String>,
    pub agent_pair: Option<String>,
    pub priority: Priority,
    /// Prerequisite task ids
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    pub timeout_ms: Option<u64>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub skippable: bool,
    pub input: Payload,
    pub result: Option<Payload>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// An ordered collection of tasks sharing a lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub timeout_ms: Option<u64>,
    pub status: WorkflowStatus,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub metadata: Payload,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Reason for failure or cancellation
    pub error: Option<String>,
}

impl Workflow {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_by_key(&self, key: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key == key)
    }

    pub(crate) fn task_index(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn progress(&self) -> WorkflowProgress {
        let mut progress = WorkflowProgress {
            total: self.tasks.len(),
            ..Default::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending | TaskStatus::Ready => progress.pending += 1,
                TaskStatus::InProgress => progress.in_progress += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::Blocked => progress.blocked += 1,
                TaskStatus::Skipped => progress.skipped += 1,
            }
        }
        progress
    }

    /// Result payloads keyed by task key, for completed tasks
    pub fn results(&self) -> Payload {
        self.tasks
            .iter()
            .filter_map(|t| {
                t.result
                    .as_ref()
                    .map(|r| (t.key.clone(), Value::Object(r.clone())))
            })
            .collect()
    }
}

/// Per-status task counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
}

impl WorkflowProgress {
    pub fn all_terminal(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }

    pub fn fraction_done(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.pending - self.in_progress) as f64 / self.total as f64
    }
}
