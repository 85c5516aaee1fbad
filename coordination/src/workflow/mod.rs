//! Workflow scheduling
//!
//! - [`types`]: workflow, task and status model
//! - [`queue`]: priority-ordered ready queue
//! - [`executor`]: kind-keyed executor registry
//! - [`scheduler`]: lifecycle control and the execution loop

pub mod executor;
pub mod queue;
pub mod scheduler;
pub mod types;

pub use executor::{
    AgentPairExecutor, ExecutorError, ExecutorRegistry, FnExecutor, SharedExecutor, TaskContext,
    TaskExecutor,
};
pub use queue::{QueueEntry, ReadyQueue};
pub use scheduler::{SchedulerStats, WorkflowDefinition, WorkflowScheduler};
pub use types::{
    Priority, Task, TaskId, TaskSpec, TaskStatus, Workflow, WorkflowId, WorkflowProgress,
    WorkflowStatus,
};
