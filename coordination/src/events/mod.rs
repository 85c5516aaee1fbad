//! Event-driven coordination
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): one [`CoordinationEvent`] shape for every
//!    workflow, step, debate and agent-task transition.
//!
//! 2. **Event Bus** (`bus.rs`): synchronous handlers plus a Tokio broadcast
//!    stream, a bounded retained queue for polling consumers, and optional
//!    persistence to the knowledge base.
//!
//! 3. **Event History** (`history.rs`): query and replay for debugging and
//!    recovery.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Scheduler / │────▶│  Event Bus   │────▶│  Handlers /  │
//! │ Debate engine│     │  (emit)      │     │  Streams     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                    ┌────────┴────────┐
//!                    ▼                 ▼
//!             ┌──────────────┐  ┌──────────────┐
//!             │   Retained   │  │  Knowledge   │
//!             │    queue     │  │    base      │
//!             └──────────────┘  └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use content_council::events::{CoordinationEvent, EventBus, EventType};
//!
//! let bus = EventBus::new().shared();
//! bus.subscribe(EventType::WorkflowCompleted, |event| {
//!     println!("done: {:?}", event.workflow_id);
//!     Ok(())
//! });
//! bus.emit(CoordinationEvent::workflow(EventType::WorkflowCompleted, "wf-1"));
//! ```

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{
    EventBus, EventBusExt, EventFilter, FilteredReceiver, HandlerError, HandlerId, SharedEventBus,
};
pub use history::{EventHistory, HistoryError, HistoryResult, ReplayStats};
pub use types::{CoordinationEvent, EventId, EventType};
