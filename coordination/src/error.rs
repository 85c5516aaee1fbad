//! Coordination error taxonomy
//!
//! Every synchronous control operation on the scheduler and debate engine
//! returns a [`CoordinationError`]. Task-level failures never surface here;
//! they are absorbed into task state and reported through events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debate::state::ArgumentType;
use crate::knowledge::KnowledgeError;

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors raised by the scheduler, debate engine and orchestrator
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Malformed creation request
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Operation attempted in an incompatible status
    #[error("Cannot {operation} {entity} {id} while it is {status}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
        operation: &'static str,
    },

    /// Argument submitted out of protocol order or by the wrong agent
    #[error("Sequence violation in debate {debate_id}: got {got}, expected one of {expected:?} ({reason})")]
    SequenceViolation {
        debate_id: String,
        expected: Vec<ArgumentType>,
        got: ArgumentType,
        reason: String,
    },

    /// A task executor or consensus evaluator raised
    #[error("Execution failed: {message}")]
    ExecutionFailure { message: String },

    /// Concurrency ceiling or queue capacity reached
    #[error("Resource exhausted: {resource} (limit {limit})")]
    ResourceExhausted { resource: &'static str, limit: usize },

    /// Unknown identity passed to an accessor
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A caller-side wait elapsed
    #[error("Timed out after {ms}ms waiting to {operation}")]
    Timeout { operation: &'static str, ms: u64 },

    /// Knowledge-base infrastructure failure
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    /// An internal lock was poisoned by a panicking holder
    #[error("Internal lock poisoned")]
    LockPoisoned,
}

impl CoordinationError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(
        entity: &'static str,
        id: impl ToString,
        status: impl ToString,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            status: status.to_string(),
            operation,
        }
    }

    /// Create an execution failure
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::SequenceViolation { .. } => ErrorKind::SequenceViolation,
            Self::ExecutionFailure { .. } => ErrorKind::ExecutionFailure,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Knowledge(_) => ErrorKind::Infrastructure,
            Self::LockPoisoned => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Knowledge(e) => e.is_retryable(),
            other => other.kind().is_retryable(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoordinationError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

/// Copyable classification of a [`CoordinationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    SequenceViolation,
    ExecutionFailure,
    ResourceExhausted,
    NotFound,
    Timeout,
    Infrastructure,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted | Self::Timeout | Self::Infrastructure
        )
    }

    /// One-line recovery hint for the caller
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "Fix the request; it will never succeed as submitted",
            Self::InvalidState => "Check the current status before repeating the operation",
            Self::SequenceViolation => {
                "Submit an argument type permitted after the previous one, from the other agent"
            }
            Self::ExecutionFailure => "Inspect the recorded error on the task or debate",
            Self::ResourceExhausted => "Back off and retry once running work has finished",
            Self::NotFound => "Verify the identifier; it may belong to another instance",
            Self::Timeout => "Wait longer or poll the snapshot again later",
            Self::Infrastructure => "Retry after the knowledge base becomes available",
            Self::Internal => "Restart the coordinator; internal state may be inconsistent",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidState => "invalid_state",
            Self::SequenceViolation => "sequence_violation",
            Self::ExecutionFailure => "execution_failure",
            Self::ResourceExhausted => "resource_exhausted",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Infrastructure => "infrastructure",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}
