//! Event bus for workflow and debate coordination
//!
//! Two delivery paths share one emit call:
//! - synchronous handlers registered with [`EventBus::subscribe`], run in
//!   registration order on the emitting thread
//! - a Tokio broadcast channel for async consumers
//!
//! The last `retained_capacity` events are also kept for polling consumers,
//! and can optionally be written to a knowledge base for replay.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::{CoordinationEvent, EventType};
use crate::config::EventBusConfig;
use crate::knowledge::{RecordKind, SharedKnowledgeBase};

/// Identifier returned by handler registration
pub type HandlerId = u64;

/// Bus handle shared between the scheduler, the debate engine and callers
pub type SharedEventBus = Arc<EventBus>;

/// Error a handler may return; logged and otherwise ignored
#[derive(Debug, thiserror::Error)]
#[error("Event handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

type HandlerFn = dyn Fn(&CoordinationEvent) -> Result<(), HandlerError> + Send + Sync;

struct Registration {
    id: HandlerId,
    event_type: Option<EventType>,
    handler: Arc<HandlerFn>,
}

/// Event bus with handlers, broadcast channel and a retained queue
pub struct EventBus {
    sender: broadcast::Sender<CoordinationEvent>,
    handlers: RwLock<Vec<Registration>>,
    retained: Mutex<VecDeque<CoordinationEvent>>,
    retained_capacity: usize,
    sequence: AtomicU64,
    next_handler_id: AtomicU64,
    store: Option<SharedKnowledgeBase>,
}

impl EventBus {
    /// Bus that keeps events in memory only
    pub fn new() -> Self {
        Self::from_config(&EventBusConfig::default(), None)
    }

    /// Create an event bus that writes every event to `store`
    pub fn with_persistence(store: SharedKnowledgeBase) -> Self {
        Self::from_config(&EventBusConfig::default(), Some(store))
    }

    /// Create an event bus from configuration.
    ///
    /// `store` is only used when `config.persist_events` is set, or when the
    /// bus was built through [`EventBus::with_persistence`].
    pub fn from_config(config: &EventBusConfig, store: Option<SharedKnowledgeBase>) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        let persist = config.persist_events || store.is_some();
        Self {
            sender,
            handlers: RwLock::new(Vec::new()),
            retained: Mutex::new(VecDeque::new()),
            retained_capacity: config.retained_capacity,
            sequence: AtomicU64::new(0),
            next_handler_id: AtomicU64::new(1),
            store: if persist { store } else { None },
        }
    }

    /// Wrap in an `Arc`
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Knowledge base events are persisted to, if any
    pub fn store(&self) -> Option<&SharedKnowledgeBase> {
        self.store.as_ref()
    }

    /// Publish an event; returns the sequence number assigned to it.
    ///
    /// Never fails: handler errors and persistence errors are logged.
    pub fn emit(&self, mut event: CoordinationEvent) -> u64 {
        let event_type = event.event_type;

        // Sequence assignment and retention happen under one lock so the
        // retained queue is always in sequence order.
        let sequence = {
            let mut retained = self.retained.lock().unwrap_or_else(|e| e.into_inner());
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            event.sequence = sequence;
            if self.retained_capacity > 0 {
                while retained.len() >= self.retained_capacity {
                    retained.pop_front();
                }
                retained.push_back(event.clone());
            }
            sequence
        };

        if let Some(store) = &self.store {
            let key = format!("{sequence:020}-{}", event.event_id);
            let persisted = serde_json::to_value(&event)
                .map_err(crate::knowledge::KnowledgeError::from)
                .and_then(|value| store.put(RecordKind::Event, &key, value));
            if let Err(e) = persisted {
                warn!(event_type = %event_type, sequence, "Failed to persist event: {}", e);
            }
        }

        self.dispatch(&event);

        match self.sender.send(event) {
            Ok(count) => debug!(event_type = %event_type, sequence, receivers = count, "Event published"),
            Err(_) => debug!(event_type = %event_type, sequence, "Event published (no receivers)"),
        }
        sequence
    }

    fn dispatch(&self, event: &CoordinationEvent) {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<(HandlerId, Arc<HandlerFn>)> = {
            let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            guard
                .iter()
                .filter(|r| r.event_type.map_or(true, |t| t == event.event_type))
                .map(|r| (r.id, Arc::clone(&r.handler)))
                .collect()
        };

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(handler_id = id, event_type = %event.event_type, "{}", e);
                }
                Err(_) => {
                    warn!(handler_id = id, event_type = %event.event_type, "Event handler panicked");
                }
            }
        }
    }

    /// Register a handler for one event type
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> HandlerId
    where
        F: Fn(&CoordinationEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(Some(event_type), Arc::new(handler))
    }

    /// Register a handler for every event
    pub fn subscribe_all<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&CoordinationEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, event_type: Option<EventType>, handler: Arc<HandlerFn>) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.push(Registration {
            id,
            event_type,
            handler,
        });
        id
    }

    /// Remove a handler; returns whether it was registered
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|r| r.id != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Subscribe to the async broadcast stream
    pub fn subscribe_stream(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current stream subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Snapshot of the retained queue, oldest first
    pub fn retained(&self) -> Vec<CoordinationEvent> {
        let retained = self.retained.lock().unwrap_or_else(|e| e.into_inner());
        retained.iter().cloned().collect()
    }

    /// Retained events with a sequence greater than `after`
    pub fn poll_since(&self, after: u64) -> Vec<CoordinationEvent> {
        let retained = self.retained.lock().unwrap_or_else(|e| e.into_inner());
        retained
            .iter()
            .filter(|e| e.sequence > after)
            .cloned()
            .collect()
    }

    /// Sequence number of the most recently emitted event
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Criteria a subscriber uses to narrow the stream
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub workflow_id: Option<String>,
    pub debate_id: Option<String>,
    pub task_id: Option<String>,
    pub event_types: Option<Vec<EventType>>,
}

impl EventFilter {
    /// Filter with no criteria; everything passes
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow(mut self, workflow_id: &str) -> Self {
        self.workflow_id = Some(workflow_id.to_string());
        self
    }

    pub fn debate(mut self, debate_id: &str) -> Self {
        self.debate_id = Some(debate_id.to_string());
        self
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// An id filter only matches events carrying that exact id
    pub fn matches(&self, event: &CoordinationEvent) -> bool {
        fn id_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
            match wanted {
                Some(w) => actual.as_deref() == Some(w.as_str()),
                None => true,
            }
        }

        if !id_matches(&self.workflow_id, &event.workflow_id)
            || !id_matches(&self.debate_id, &event.debate_id)
            || !id_matches(&self.task_id, &event.task_id)
        {
            return false;
        }

        match &self.event_types {
            Some(types) => types.contains(&event.event_type),
            None => true,
        }
    }
}

/// Broadcast receiver that skips events the filter rejects
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<CoordinationEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next event that passes the filter
    pub async fn recv(&mut self) -> Result<CoordinationEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Filtered subscriptions on a shared bus
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe_stream(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe_stream(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{InMemoryKnowledgeBase, KnowledgeBase, RecordFilter};
    use std::sync::atomic::AtomicUsize;

    fn step(ty: EventType, task: &str) -> CoordinationEvent {
        CoordinationEvent::step(ty, "wf-1", task)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(EventType::StepStarted, move |_| {
                log.lock().unwrap().push(name);
                Ok(())
            });
        }

        bus.emit(step(EventType::StepStarted, "a"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_type_filtering_and_subscribe_all() {
        let bus = EventBus::new();
        let typed = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&typed);
        bus.subscribe(EventType::StepCompleted, move |_| {
            t.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let a = Arc::clone(&all);
        bus.subscribe_all(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(step(EventType::StepStarted, "a"));
        bus.emit(step(EventType::StepCompleted, "a"));

        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_and_panicking_handlers_do_not_stop_delivery() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.subscribe_all(|_| Err(HandlerError::new("boom")));
        bus.subscribe_all(|_| panic!("handler bug"));
        let r = Arc::clone(&reached);
        bus.subscribe_all(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let seq = bus.emit(step(EventType::StepFailed, "a"));
        assert_eq!(seq, 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = bus.subscribe_all(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(step(EventType::StepStarted, "a"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(step(EventType::StepStarted, "b"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_retained_queue_is_bounded() {
        let config = EventBusConfig {
            retained_capacity: 3,
            ..Default::default()
        };
        let bus = EventBus::from_config(&config, None);
        for i in 0..5 {
            bus.emit(step(EventType::StepStarted, &format!("t{i}")));
        }

        let retained = bus.retained();
        let seqs: Vec<u64> = retained.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);

        let since = bus.poll_since(4);
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].task_id.as_deref(), Some("t4"));
        assert_eq!(bus.last_sequence(), 5);
    }

    #[test]
    fn test_persistence_writes_events() {
        let kb = InMemoryKnowledgeBase::new().shared();
        let bus = EventBus::with_persistence(Arc::clone(&kb));
        bus.emit(step(EventType::StepStarted, "a"));
        bus.emit(step(EventType::StepCompleted, "a"));

        let stored = kb.query(RecordKind::Event, &RecordFilter::all()).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["event_type"], "step_started");
        assert_eq!(stored[1]["sequence"], 2);
    }

    #[tokio::test]
    async fn test_stream_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe_stream();
        let mut rx2 = bus.subscribe_stream();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(CoordinationEvent::debate(EventType::DebateStarted, "d-1"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type, EventType::DebateStarted);
        assert_eq!(e1.event_id, e2.event_id);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .workflow("wf-1")
            .types(vec![EventType::StepStarted, EventType::StepCompleted]);

        assert!(filter.matches(&step(EventType::StepStarted, "a")));
        assert!(!filter.matches(&step(EventType::StepFailed, "a")));
        assert!(!filter.matches(&CoordinationEvent::step(
            EventType::StepStarted,
            "wf-2",
            "a"
        )));
        // id filters are strict about missing ids
        assert!(!filter.matches(&CoordinationEvent::debate(EventType::StepStarted, "d")));
    }

    #[tokio::test]
    async fn test_receiver_skips_other_tasks() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().task("target"));

        let publisher = Arc::clone(&bus);
        tokio::spawn(async move {
            publisher.emit(step(EventType::StepStarted, "other"));
            publisher.emit(step(EventType::StepCompleted, "target"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.task_id.as_deref(), Some("target"));
        assert_eq!(event.event_type, EventType::StepCompleted);
    }
}
