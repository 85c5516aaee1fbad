//! Event history and replay
//!
//! Reads either the bus's retained queue or the events persisted to a
//! knowledge base, and replays them through a callback for recovery and
//! debugging.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::bus::SharedEventBus;
use super::types::{CoordinationEvent, EventType};
use crate::knowledge::{KnowledgeError, RecordFilter, RecordKind, SharedKnowledgeBase};

/// Failure while reading persisted events
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Store error: {0}")]
    Store(#[from] KnowledgeError),
}

/// Result alias for history reads
pub type HistoryResult<T> = Result<T, HistoryError>;

enum Source {
    Retained(SharedEventBus),
    Persisted(SharedKnowledgeBase),
}

/// Queries and replays events persisted in the knowledge base
pub struct EventHistory {
    source: Source,
}

impl EventHistory {
    /// History over the bus's retained queue
    pub fn from_bus(bus: SharedEventBus) -> Self {
        Self {
            source: Source::Retained(bus),
        }
    }

    /// History over events persisted to a knowledge base
    pub fn from_store(store: SharedKnowledgeBase) -> Self {
        Self {
            source: Source::Persisted(store),
        }
    }

    /// All available events in sequence order
    pub fn events(&self) -> HistoryResult<Vec<CoordinationEvent>> {
        let mut events = match &self.source {
            Source::Retained(bus) => bus.retained(),
            Source::Persisted(store) => {
                let values = store.query(RecordKind::Event, &RecordFilter::all())?;
                values
                    .into_iter()
                    .filter_map(|value| match serde_json::from_value(value) {
                        Ok(event) => Some(event),
                        Err(e) => {
                            warn!("Skipping unreadable persisted event: {}", e);
                            None
                        }
                    })
                    .collect()
            }
        };
        events.sort_by_key(|e: &CoordinationEvent| e.sequence);
        debug!(count = events.len(), "Retrieved events from history");
        Ok(events)
    }

    /// Events with `start <= timestamp <= end`
    pub fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<CoordinationEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect())
    }

    /// Events from the last N minutes
    pub fn recent_events(&self, minutes: i64) -> HistoryResult<Vec<CoordinationEvent>> {
        let end = Utc::now();
        self.events_between(end - Duration::minutes(minutes), end)
    }

    pub fn workflow_events(&self, workflow_id: &str) -> HistoryResult<Vec<CoordinationEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.workflow_id.as_deref() == Some(workflow_id))
            .collect())
    }

    pub fn debate_events(&self, debate_id: &str) -> HistoryResult<Vec<CoordinationEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.debate_id.as_deref() == Some(debate_id))
            .collect())
    }

    /// Feed matching events, oldest first, to an async callback
    pub async fn replay<F, Fut>(
        &self,
        events: Vec<CoordinationEvent>,
        mut callback: F,
    ) -> ReplayStats
    where
        F: FnMut(CoordinationEvent) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        info!(total = events.len(), "Starting event replay");

        let mut stats = ReplayStats::new();
        for event in events {
            stats.record_event(&event);
            callback(event).await;
        }

        info!(
            total = stats.total_events,
            workflows = stats.workflows_seen,
            debates = stats.debates_seen,
            "Replayed persisted events"
        );
        stats
    }

    /// Replay everything the source holds
    pub async fn replay_all<F, Fut>(&self, callback: F) -> HistoryResult<ReplayStats>
    where
        F: FnMut(CoordinationEvent) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let events = self.events()?;
        Ok(self.replay(events, callback).await)
    }
}

/// Counts gathered while replaying
#[derive(Debug, Default)]
pub struct ReplayStats {
    pub total_events: usize,
    pub workflows_seen: usize,
    pub debates_seen: usize,
    pub failures_seen: usize,
    pub by_type: BTreeMap<EventType, usize>,
    workflows: HashSet<String>,
    debates: HashSet<String>,
}

impl ReplayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: &CoordinationEvent) {
        self.total_events += 1;
        *self.by_type.entry(event.event_type).or_insert(0) += 1;

        if let Some(id) = &event.workflow_id {
            if self.workflows.insert(id.clone()) {
                self.workflows_seen += 1;
            }
        }

        if let Some(id) = &event.debate_id {
            if self.debates.insert(id.clone()) {
                self.debates_seen += 1;
            }
        }

        if matches!(
            event.event_type,
            EventType::StepFailed
                | EventType::WorkflowFailed
                | EventType::DebateFailed
                | EventType::AgentTaskFailed
        ) {
            self.failures_seen += 1;
        }
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.by_type.get(&event_type).copied().unwrap_or(0)
    }
}
