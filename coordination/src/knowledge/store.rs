//! Knowledge-base interface and in-memory backend
//!
//! Records are JSON values grouped by [`RecordKind`]. The coordinator only
//! ever needs put/get/query/delete; richer storage is an adapter concern.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Error type for knowledge-base operations
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Knowledge base unavailable: {0}")]
    Unavailable(String),
}

impl KnowledgeError {
    /// Transient infrastructure failures worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Unavailable(_))
    }
}

/// Result type for knowledge-base operations
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

/// Shared reference to a knowledge base
pub type SharedKnowledgeBase = Arc<dyn KnowledgeBase>;

/// Logical record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    DebateRecord,
    WorkflowTemplate,
    KnowledgeItem,
    Event,
    Checkpoint,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        Self::DebateRecord,
        Self::WorkflowTemplate,
        Self::KnowledgeItem,
        Self::Event,
        Self::Checkpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DebateRecord => "debate_record",
            Self::WorkflowTemplate => "workflow_template",
            Self::KnowledgeItem => "knowledge_item",
            Self::Event => "event",
            Self::Checkpoint => "checkpoint",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level field equality filter with an optional result limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub fields: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

/// Record store consumed by the coordinator.
///
/// Ids within a kind are returned by `query` in ascending key order.
pub trait KnowledgeBase: Send + Sync {
    fn put(&self, kind: RecordKind, id: &str, record: Value) -> KnowledgeResult<()>;

    fn get(&self, kind: RecordKind, id: &str) -> KnowledgeResult<Option<Value>>;

    fn query(&self, kind: RecordKind, filter: &RecordFilter) -> KnowledgeResult<Vec<Value>>;

    /// Returns whether a record was removed
    fn delete(&self, kind: RecordKind, id: &str) -> KnowledgeResult<bool>;
}

/// Typed helpers over any [`KnowledgeBase`]
pub trait KnowledgeBaseExt: KnowledgeBase {
    fn put_record<T: Serialize>(&self, kind: RecordKind, id: &str, record: &T) -> KnowledgeResult<()> {
        let value = serde_json::to_value(record)?;
        self.put(kind, id, value)
    }

    fn get_record<T: DeserializeOwned>(&self, kind: RecordKind, id: &str) -> KnowledgeResult<Option<T>> {
        match self.get(kind, id)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn query_records<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> KnowledgeResult<Vec<T>> {
        self.query(kind, filter)?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(KnowledgeError::from))
            .collect()
    }
}

impl<T: KnowledgeBase + ?Sized> KnowledgeBaseExt for T {}

/// Bounded retry policy for knowledge-base writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Write a record, retrying retryable failures with linear backoff
pub async fn put_with_retry(
    kb: &dyn KnowledgeBase,
    kind: RecordKind,
    id: &str,
    record: Value,
    policy: RetryPolicy,
) -> KnowledgeResult<()> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match kb.put(kind, id, record.clone()) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(kind = %kind, id, attempt, error = %e, "Knowledge base write failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Process-local knowledge base
#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    records: RwLock<HashMap<RecordKind, BTreeMap<String, Value>>>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedKnowledgeBase {
        Arc::new(self)
    }

    /// Number of records stored under a kind
    pub fn count(&self, kind: RecordKind) -> KnowledgeResult<usize> {
        let records = self.records.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        Ok(records.get(&kind).map(BTreeMap::len).unwrap_or(0))
    }
}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn put(&self, kind: RecordKind, id: &str, record: Value) -> KnowledgeResult<()> {
        let mut records = self.records.write().map_err(|_| KnowledgeError::LockPoisoned)?;
        records.entry(kind).or_default().insert(id.to_string(), record);
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> KnowledgeResult<Option<Value>> {
        let records = self.records.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        Ok(records.get(&kind).and_then(|m| m.get(id)).cloned())
    }

    fn query(&self, kind: RecordKind, filter: &RecordFilter) -> KnowledgeResult<Vec<Value>> {
        let records = self.records.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        let Some(bucket) = records.get(&kind) else {
            return Ok(Vec::new());
        };
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(bucket
            .values()
            .filter(|v| filter.matches(v))
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> KnowledgeResult<bool> {
        let mut records = self.records.write().map_err(|_| KnowledgeError::LockPoisoned)?;
        Ok(records
            .get_mut(&kind)
            .map(|m| m.remove(id).is_some())
            .unwrap_or(false))
    }
}
