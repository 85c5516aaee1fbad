//! Debate engine
//!
//! Owns every debate and enforces the turn-taking protocol. Submissions
//! to one debate are serialized by that debate's lock; different debates
//! never contend beyond a brief read of the registry map.
//!
//! A resolution closes the round and evaluates it on a staged copy, so
//! observers see either the fully evaluated round or the state before it.
//!
//! Events are queued on the debate's outbox while its lock is held and
//! delivered after release by whichever caller drains first, so the bus
//! sees one debate's events in protocol order and handlers may call back
//! into the engine.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::consensus::{ConsensusMetrics, EvaluatorSet, RoundView};
use super::persistence::{DebateCheckpoint, IntegrityStatus, PersistenceError};
use super::scoring::{argument_confidence, tag_impact_areas};
use super::state::{Argument, ArgumentType, Debate, DebateStatus, Evidence};
use crate::agents::Payload;
use crate::config::DebateConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::events::{CoordinationEvent, EventType, SharedEventBus};
use crate::telemetry;

/// Shared reference to the engine
pub type SharedDebateEngine = Arc<DebateEngine>;

/// Per-debate overrides of the engine defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateSettings {
    pub max_rounds: Option<u32>,
    pub consensus_threshold: Option<f64>,
}

impl DebateSettings {
    pub fn max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn consensus_threshold(mut self, threshold: f64) -> Self {
        self.consensus_threshold = Some(threshold);
        self
    }
}

/// One debate plus the events it has produced but not yet delivered
struct DebateSlot {
    state: Mutex<Debate>,
    outbox: Mutex<Outbox>,
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<CoordinationEvent>,
    draining: bool,
}

impl DebateSlot {
    fn new(debate: Debate) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(debate),
            outbox: Mutex::new(Outbox::default()),
        })
    }

    /// Queue events behind earlier ones; callers hold `state`
    fn enqueue(&self, events: impl IntoIterator<Item = CoordinationEvent>) {
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .extend(events);
    }
}

pub struct DebateEngine {
    config: DebateConfig,
    evaluators: EvaluatorSet,
    bus: SharedEventBus,
    debates: RwLock<HashMap<String, Arc<DebateSlot>>>,
    checkpoint_seq: AtomicU64,
}

impl DebateEngine {
    pub fn new(config: DebateConfig, evaluators: EvaluatorSet, bus: SharedEventBus) -> Self {
        Self {
            config,
            evaluators,
            bus,
            debates: RwLock::new(HashMap::new()),
            checkpoint_seq: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> SharedDebateEngine {
        Arc::new(self)
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a pending debate with the configured defaults
    pub fn create_debate(
        &self,
        topic: &str,
        description: &str,
        primary_agent_id: &str,
        adversary_agent_id: &str,
    ) -> CoordinationResult<String> {
        self.create_debate_with(
            topic,
            description,
            primary_agent_id,
            adversary_agent_id,
            DebateSettings::default(),
        )
    }

    /// Create a pending debate with per-debate overrides
    pub fn create_debate_with(
        &self,
        topic: &str,
        description: &str,
        primary_agent_id: &str,
        adversary_agent_id: &str,
        settings: DebateSettings,
    ) -> CoordinationResult<String> {
        if primary_agent_id.trim().is_empty() || adversary_agent_id.trim().is_empty() {
            return Err(CoordinationError::invalid_argument(
                "both debate participants must be named",
            ));
        }
        if primary_agent_id == adversary_agent_id {
            return Err(CoordinationError::invalid_argument(format!(
                "agent {primary_agent_id} cannot debate itself"
            )));
        }
        let max_rounds = settings.max_rounds.unwrap_or(self.config.max_rounds);
        if max_rounds == 0 {
            return Err(CoordinationError::invalid_argument("max_rounds must be at least 1"));
        }
        let threshold = settings
            .consensus_threshold
            .unwrap_or(self.config.consensus_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CoordinationError::invalid_argument(format!(
                "consensus threshold {threshold} outside [0, 1]"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let debate = Debate::new(
            &id,
            topic,
            description,
            primary_agent_id,
            adversary_agent_id,
            max_rounds,
            threshold,
        );

        self.debates
            .write()?
            .insert(id.clone(), DebateSlot::new(debate));

        info!(debate_id = %id, topic, max_rounds, threshold, "Debate created");
        self.bus.emit(
            CoordinationEvent::debate(EventType::DebateCreated, &id)
                .with_data("topic", topic)
                .with_data("primary_agent_id", primary_agent_id)
                .with_data("adversary_agent_id", adversary_agent_id),
        );
        Ok(id)
    }

    /// Open round 1 of a pending debate
    pub fn start_debate(&self, debate_id: &str) -> CoordinationResult<()> {
        let slot = self.slot(debate_id)?;
        {
            let mut debate = slot.state.lock()?;
            if debate.status != DebateStatus::Pending {
                return Err(CoordinationError::invalid_state(
                    "debate",
                    debate_id,
                    debate.status,
                    "start",
                ));
            }
            debate
                .transition(DebateStatus::InProgress, "debate started")
                .map_err(|e| CoordinationError::execution(e.to_string()))?;
            debate.started_at = Some(Utc::now());
            let round = debate.open_round().round_number;
            slot.enqueue([
                CoordinationEvent::debate(EventType::DebateStarted, debate_id),
                CoordinationEvent::debate(EventType::RoundStarted, debate_id).with_round(round),
            ]);
        }

        info!(debate_id = %debate_id, "Debate started");
        self.flush(&slot);
        Ok(())
    }

    /// Submit one argument to the open round.
    ///
    /// Protocol violations surface as errors and leave the debate untouched.
    /// A resolution closes and evaluates the round before this returns.
    pub fn submit_argument(
        &self,
        debate_id: &str,
        agent_id: &str,
        argument_type: ArgumentType,
        content: Payload,
        references: Vec<String>,
        evidence: Vec<Evidence>,
    ) -> CoordinationResult<Argument> {
        let slot = self.slot(debate_id)?;
        let mut events = Vec::new();

        let outcome = {
            let mut debate = slot.state.lock()?;
            let _span = telemetry::debate_span(debate_id, &debate.topic).entered();

            if debate.status != DebateStatus::InProgress {
                return Err(CoordinationError::invalid_state(
                    "debate",
                    debate_id,
                    debate.status,
                    "submit an argument to",
                ));
            }
            let last = debate
                .active_round()
                .ok_or_else(|| {
                    CoordinationError::invalid_state("debate", debate_id, "between rounds", "submit an argument to")
                })?
                .last_argument()
                .map(|a| (a.argument_type, a.agent_id.clone()));

            let permitted = ArgumentType::permitted_next(last.as_ref().map(|(t, _)| *t));
            let violation = |reason: String| CoordinationError::SequenceViolation {
                debate_id: debate_id.to_string(),
                expected: permitted.to_vec(),
                got: argument_type,
                reason,
            };
            if !debate.is_participant(agent_id) {
                return Err(violation(format!("{agent_id} is not a participant")));
            }
            if !permitted.contains(&argument_type) {
                let after = last
                    .as_ref()
                    .map_or("the start of a round".to_string(), |(t, _)| t.to_string());
                return Err(violation(format!("{argument_type} cannot follow {after}")));
            }
            if let Some((_, previous_agent)) = &last {
                if previous_agent == agent_id {
                    return Err(violation(format!(
                        "{agent_id} also submitted the previous argument"
                    )));
                }
            }
            if let Some(missing) = references.iter().find(|r| debate.argument(r).is_none()) {
                return Err(CoordinationError::invalid_argument(format!(
                    "reference {missing} is not an earlier argument of debate {debate_id}"
                )));
            }

            let argument = Argument {
                id: Uuid::new_v4().to_string(),
                debate_id: debate_id.to_string(),
                argument_type,
                confidence: argument_confidence(&evidence),
                impact_areas: tag_impact_areas(&content),
                content,
                agent_id: agent_id.to_string(),
                timestamp: Utc::now(),
                references,
                evidence,
            };

            debug!(
                debate_id = %debate_id,
                round = debate.current_round,
                agent = %agent_id,
                argument_type = %argument_type,
                confidence = argument.confidence,
                "Argument accepted"
            );
            events.push(
                CoordinationEvent::debate(EventType::ArgumentSubmitted, debate_id)
                    .with_round(debate.current_round)
                    .with_agent(agent_id)
                    .with_data("argument_id", argument.id.clone())
                    .with_data("argument_type", argument_type.as_str())
                    .with_data("confidence", argument.confidence)
                    .with_data("impact_areas", argument.impact_areas.clone()),
            );

            let accepted = if argument_type.closes_round() {
                self.close_round(&mut debate, argument.clone(), &mut events)
                    .map(|()| argument)
            } else if let Some(round) = debate.active_round_mut() {
                round.arguments.push(argument.clone());
                Ok(argument)
            } else {
                Err(CoordinationError::execution("open round disappeared"))
            };
            slot.enqueue(events);
            accepted
        };

        self.flush(&slot);
        outcome
    }

    /// Stop a pending or in-progress debate
    pub fn terminate_debate(&self, debate_id: &str, reason: &str) -> CoordinationResult<()> {
        let slot = self.slot(debate_id)?;
        {
            let mut debate = slot.state.lock()?;
            if !matches!(debate.status, DebateStatus::Pending | DebateStatus::InProgress) {
                return Err(CoordinationError::invalid_state(
                    "debate",
                    debate_id,
                    debate.status,
                    "terminate",
                ));
            }
            debate
                .transition(DebateStatus::Terminated, reason)
                .map_err(|e| CoordinationError::execution(e.to_string()))?;
            debate.failure = Some(reason.to_string());
            slot.enqueue([CoordinationEvent::debate(EventType::DebateTerminated, debate_id)
                .with_data("reason", reason)]);
        }

        info!(debate_id = %debate_id, reason, "Debate terminated");
        self.flush(&slot);
        Ok(())
    }

    /// Archive a debate that reached an outcome; the outcome is preserved
    pub fn complete_debate(&self, debate_id: &str) -> CoordinationResult<DebateStatus> {
        let slot = self.slot(debate_id)?;
        let outcome = {
            let mut debate = slot.state.lock()?;
            if !debate.status.is_outcome() {
                return Err(CoordinationError::invalid_state(
                    "debate",
                    debate_id,
                    debate.status,
                    "complete",
                ));
            }
            let outcome = debate.status;
            debate
                .transition(DebateStatus::Completed, "debate archived")
                .map_err(|e| CoordinationError::execution(e.to_string()))?;
            slot.enqueue([CoordinationEvent::debate(EventType::DebateCompleted, debate_id)
                .with_data("outcome", outcome.to_string())]);
            outcome
        };

        info!(debate_id = %debate_id, outcome = %outcome, "Debate completed");
        self.flush(&slot);
        Ok(outcome)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Consistent snapshot of a debate
    pub fn get_debate(&self, debate_id: &str) -> CoordinationResult<Debate> {
        let slot = self.slot(debate_id)?;
        let debate = slot.state.lock()?;
        Ok(debate.clone())
    }

    /// Snapshots of every debate, oldest first
    pub fn list_debates(&self) -> CoordinationResult<Vec<Debate>> {
        let slots: Vec<_> = self.debates.read()?.values().cloned().collect();
        let mut debates = Vec::with_capacity(slots.len());
        for slot in slots {
            debates.push(slot.state.lock()?.clone());
        }
        debates.sort_by_key(|d| d.created_at);
        Ok(debates)
    }

    /// Snapshot a debate as a versioned checkpoint
    pub fn checkpoint(&self, debate_id: &str, reason: &str) -> CoordinationResult<DebateCheckpoint> {
        let debate = self.get_debate(debate_id)?;
        let sequence = self.checkpoint_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(debate_id = %debate_id, sequence, reason, "Debate checkpointed");
        Ok(DebateCheckpoint::new(&debate, reason, sequence))
    }

    /// Re-import a checkpointed debate.
    ///
    /// Corrupted checkpoints and ids that are already live are rejected.
    pub fn restore(&self, checkpoint: DebateCheckpoint) -> Result<IntegrityStatus, PersistenceError> {
        let status = checkpoint.verify()?;
        if let IntegrityStatus::Recoverable { ref warnings } = status {
            warn!(
                debate_id = %checkpoint.debate.id,
                warnings = warnings.len(),
                "Restoring checkpoint with warnings: {}",
                warnings.join("; ")
            );
        }

        let mut debates = self
            .debates
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let id = checkpoint.debate.id.clone();
        if debates.contains_key(&id) {
            return Err(PersistenceError::AlreadyLive { debate_id: id });
        }
        debates.insert(id.clone(), DebateSlot::new(checkpoint.debate));
        info!(debate_id = %id, sequence = checkpoint.sequence, "Debate restored");
        Ok(status)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Deliver queued events unless another caller is already delivering
    /// them; that caller picks up anything queued meanwhile.
    fn flush(&self, slot: &DebateSlot) {
        {
            let mut outbox = slot.outbox.lock().unwrap_or_else(|e| e.into_inner());
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        loop {
            let next = {
                let mut outbox = slot.outbox.lock().unwrap_or_else(|e| e.into_inner());
                let next = outbox.pending.pop_front();
                if next.is_none() {
                    outbox.draining = false;
                }
                next
            };
            match next {
                Some(event) => {
                    self.bus.emit(event);
                }
                None => break,
            }
        }
    }

    fn slot(&self, debate_id: &str) -> CoordinationResult<Arc<DebateSlot>> {
        self.debates
            .read()?
            .get(debate_id)
            .cloned()
            .ok_or_else(|| CoordinationError::not_found("debate", debate_id))
    }

    /// Append the resolution, evaluate the round and decide the debate's fate.
    fn close_round(
        &self,
        debate: &mut Debate,
        resolution: Argument,
        events: &mut Vec<CoordinationEvent>,
    ) -> CoordinationResult<()> {
        let mut staged = debate.clone();
        let round_number = staged.current_round;
        let Some(round) = staged.active_round_mut() else {
            return Err(CoordinationError::execution("open round disappeared"));
        };
        round.arguments.push(resolution);
        round.ended_at = Some(Utc::now());

        let evaluated = staged
            .rounds
            .last()
            .ok_or_else(|| CoordinationError::execution("open round disappeared"))
            .and_then(|round| {
                self.evaluators
                    .evaluate(&RoundView::new(&staged, round))
                    .map_err(|e| CoordinationError::execution(e.to_string()))
            });

        let metrics = match evaluated {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(debate_id = %debate.id, round = round_number, "Round evaluation failed: {}", err);
                debate
                    .transition(DebateStatus::Failed, "round evaluation failed")
                    .map_err(|e| CoordinationError::execution(e.to_string()))?;
                debate.failure = Some(err.to_string());
                telemetry::record_debate_outcome(&tracing::Span::current(), "failed");
                events.push(
                    CoordinationEvent::debate(EventType::DebateFailed, &debate.id)
                        .with_round(round_number)
                        .with_data("error", err.to_string()),
                );
                return Err(err);
            }
        };

        if let Some(round) = staged.rounds.last_mut() {
            round.metrics = Some(metrics.clone());
        }
        events.push(round_completed(&staged.id, round_number, &metrics));

        if metrics.meets(staged.consensus_threshold) {
            staged
                .transition(DebateStatus::ConsensusReached, "agreement met threshold")
                .map_err(|e| CoordinationError::execution(e.to_string()))?;
            info!(
                debate_id = %staged.id,
                round = round_number,
                agreement = metrics.agreement_score,
                "Consensus reached"
            );
            telemetry::record_debate_outcome(&tracing::Span::current(), "consensus_reached");
            events.push(
                CoordinationEvent::debate(EventType::ConsensusReached, &staged.id)
                    .with_round(round_number)
                    .with_data("agreement_score", metrics.agreement_score),
            );
        } else if staged.current_round >= staged.max_rounds {
            staged
                .transition(DebateStatus::Deadlocked, "max rounds without consensus")
                .map_err(|e| CoordinationError::execution(e.to_string()))?;
            info!(
                debate_id = %staged.id,
                rounds = round_number,
                agreement = metrics.agreement_score,
                "Debate deadlocked"
            );
            telemetry::record_debate_outcome(&tracing::Span::current(), "deadlocked");
            events.push(
                CoordinationEvent::debate(EventType::DebateDeadlocked, &staged.id)
                    .with_round(round_number)
                    .with_data("agreement_score", metrics.agreement_score),
            );
        } else {
            let next = staged.open_round().round_number;
            debug!(debate_id = %staged.id, round = next, "Next round opened");
            events.push(CoordinationEvent::debate(EventType::RoundStarted, &staged.id).with_round(next));
        }

        *debate = staged;
        Ok(())
    }
}

fn round_completed(debate_id: &str, round: u32, metrics: &ConsensusMetrics) -> CoordinationEvent {
    CoordinationEvent::debate(EventType::RoundCompleted, debate_id)
        .with_round(round)
        .with_data("agreement_score", metrics.agreement_score)
        .with_data("resolution_quality", metrics.resolution_quality)
        .with_data("evidence_strength", metrics.evidence_strength)
        .with_data("implementation_feasibility", metrics.implementation_feasibility)
}

impl std::fmt::Debug for DebateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.debates.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("DebateEngine")
            .field("config", &self.config)
            .field("debates", &count)
            .finish()
    }
}
