//! Tracing setup and span helpers
//!
//! Span names use dot notation so they export cleanly to OpenTelemetry
//! collectors when a compatible layer is installed by the host binary.
//!
//! ```text
//! council.workflow        (one per started workflow)
//!   └─ council.task       (one per executor attempt)
//! council.debate          (one per driven debate)
//! ```

use tracing::Span;
use tracing_subscriber::EnvFilter;

pub const SPAN_WORKFLOW: &str = "council.workflow";
pub const SPAN_TASK: &str = "council.task";
pub const SPAN_DEBATE: &str = "council.debate";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"content_council=debug"`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Span covering the lifetime of one workflow
pub fn workflow_span(workflow_id: &str, name: &str) -> Span {
    tracing::info_span!(
        "council.workflow",
        workflow.id = %workflow_id,
        workflow.name = %name,
    )
}

/// Span covering one executor attempt
pub fn task_span(workflow_id: &str, task_key: &str, kind: &str, attempt: u32) -> Span {
    tracing::info_span!(
        "council.task",
        workflow.id = %workflow_id,
        task.key = %task_key,
        task.kind = %kind,
        task.attempt = attempt,
    )
}

/// Span covering one automated debate
pub fn debate_span(debate_id: &str, topic: &str) -> Span {
    tracing::info_span!(
        "council.debate",
        debate.id = %debate_id,
        debate.topic = %topic,
        debate.outcome = tracing::field::Empty,
    )
}

/// Record the final debate status on a span from [`debate_span`]
pub fn record_debate_outcome(span: &Span, outcome: &str) {
    span.record("debate.outcome", outcome);
}
