//! Debate state machine: argument protocol, statuses, rounds and transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::consensus::ConsensusMetrics;
use crate::agents::Payload;

/// Kind of contribution an argument makes.
///
/// ```text
/// (round start) → proposal → challenge → defense ─┬─→ resolution
///                                                 └─→ counter → resolution
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentType {
    Proposal,
    Challenge,
    Defense,
    Counter,
    Resolution,
}

impl ArgumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Challenge => "challenge",
            Self::Defense => "defense",
            Self::Counter => "counter",
            Self::Resolution => "resolution",
        }
    }

    /// Argument types accepted after `last` within one round.
    ///
    /// `None` is the start of a round. Nothing follows a resolution.
    pub fn permitted_next(last: Option<ArgumentType>) -> &'static [ArgumentType] {
        match last {
            None => &[Self::Proposal],
            Some(Self::Proposal) => &[Self::Challenge],
            Some(Self::Challenge) => &[Self::Defense],
            Some(Self::Defense) => &[Self::Counter, Self::Resolution],
            Some(Self::Counter) => &[Self::Resolution],
            Some(Self::Resolution) => &[],
        }
    }

    /// Whether an argument of this type closes its round
    pub fn closes_round(&self) -> bool {
        *self == Self::Resolution
    }

    /// Adversarial contributions; these feed the risk breakdown
    pub fn is_adversarial(&self) -> bool {
        matches!(self, Self::Challenge | Self::Counter)
    }
}

impl std::fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a debate.
///
/// `consensus_reached`, `deadlocked`, `terminated` and `failed` are
/// outcomes: no further arguments are accepted, and `complete_debate`
/// moves them to `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    Pending,
    InProgress,
    ConsensusReached,
    Deadlocked,
    Terminated,
    Failed,
    Completed,
}

impl DebateStatus {
    /// Whether the debate has left `in_progress` for good.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }

    /// Terminal statuses that can still be moved to `completed`
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            Self::ConsensusReached | Self::Deadlocked | Self::Terminated | Self::Failed
        )
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [DebateStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Terminated],
            Self::InProgress => &[
                Self::ConsensusReached,
                Self::Deadlocked,
                Self::Terminated,
                Self::Failed,
            ],
            Self::ConsensusReached | Self::Deadlocked | Self::Terminated | Self::Failed => {
                &[Self::Completed]
            }
            Self::Completed => &[],
        }
    }
}

impl std::fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::ConsensusReached => write!(f, "consensus_reached"),
            Self::Deadlocked => write!(f, "deadlocked"),
            Self::Terminated => write!(f, "terminated"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

fn default_evidence_confidence() -> f64 {
    0.8
}

/// Supporting material attached to an argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default = "Evidence::new_id")]
    pub evidence_id: String,
    /// Free-form kind, e.g. `market_data` or `case_study`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default = "default_evidence_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Payload,
}

impl Evidence {
    pub fn new(kind: impl Into<String>, source: impl Into<String>, content: Value) -> Self {
        Self {
            evidence_id: Self::new_id(),
            kind: kind.into(),
            source: source.into(),
            content,
            confidence: default_evidence_confidence(),
            metadata: Payload::new(),
        }
    }

    /// Set the confidence, clamped to `[0, 1]`
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// One contribution to a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub id: String,
    pub debate_id: String,
    pub argument_type: ArgumentType,
    pub content: Payload,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    /// Ids of earlier arguments in the same debate
    pub references: Vec<String>,
    pub evidence: Vec<Evidence>,
    /// Derived from the attached evidence, in `[0, 1]`
    pub confidence: f64,
    pub impact_areas: Vec<String>,
}

/// One bounded exchange, closed by a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub round_id: String,
    /// 1-indexed.
    pub round_number: u32,
    pub arguments: Vec<Argument>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set once the round is closed and evaluated
    pub metrics: Option<ConsensusMetrics>,
}

impl DebateRound {
    pub fn new(round_number: u32) -> Self {
        Self {
            round_id: uuid::Uuid::new_v4().to_string(),
            round_number,
            arguments: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            metrics: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn last_argument(&self) -> Option<&Argument> {
        self.arguments.last()
    }

    pub fn arguments_of(&self, argument_type: ArgumentType) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(move |a| a.argument_type == argument_type)
    }
}

/// A status transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebateStatus,
    pub to: DebateStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} → {to}")]
pub struct TransitionError {
    pub from: DebateStatus,
    pub to: DebateStatus,
}

/// Full debate state, owned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debate {
    pub id: String,
    pub topic: String,
    pub description: String,
    pub primary_agent_id: String,
    pub adversary_agent_id: String,
    pub status: DebateStatus,
    /// Outcome preserved once the debate is `completed`
    pub outcome: Option<DebateStatus>,
    pub rounds: Vec<DebateRound>,
    /// 0 until started; never exceeds `max_rounds`
    pub current_round: u32,
    pub max_rounds: u32,
    pub consensus_threshold: f64,
    pub transitions: Vec<DebateTransition>,
    /// Evaluation error or termination reason
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Debate {
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        description: impl Into<String>,
        primary_agent_id: impl Into<String>,
        adversary_agent_id: impl Into<String>,
        max_rounds: u32,
        consensus_threshold: f64,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            description: description.into(),
            primary_agent_id: primary_agent_id.into(),
            adversary_agent_id: adversary_agent_id.into(),
            status: DebateStatus::Pending,
            outcome: None,
            rounds: Vec::new(),
            current_round: 0,
            max_rounds,
            consensus_threshold,
            transitions: Vec::new(),
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Move to `to`, recording the transition
    pub fn transition(&mut self, to: DebateStatus, reason: &str) -> Result<(), TransitionError> {
        if !self.status.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }

        self.transitions.push(DebateTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        if self.status.is_outcome() && to == DebateStatus::Completed {
            self.outcome = Some(self.status);
        }
        if to.is_outcome() {
            self.ended_at = Some(Utc::now());
        }
        self.status = to;
        Ok(())
    }

    /// Append a fresh round and make it current
    pub fn open_round(&mut self) -> &DebateRound {
        self.current_round += 1;
        self.rounds.push(DebateRound::new(self.current_round));
        &self.rounds[self.rounds.len() - 1]
    }

    pub fn active_round(&self) -> Option<&DebateRound> {
        self.rounds.last().filter(|r| !r.is_closed())
    }

    pub fn active_round_mut(&mut self) -> Option<&mut DebateRound> {
        self.rounds.last_mut().filter(|r| !r.is_closed())
    }

    pub fn is_participant(&self, agent_id: &str) -> bool {
        agent_id == self.primary_agent_id || agent_id == self.adversary_agent_id
    }

    /// The other participant, if `agent_id` is one
    pub fn opponent_of(&self, agent_id: &str) -> Option<&str> {
        if agent_id == self.primary_agent_id {
            Some(self.adversary_agent_id.as_str())
        } else if agent_id == self.adversary_agent_id {
            Some(self.primary_agent_id.as_str())
        } else {
            None
        }
    }

    pub fn argument(&self, argument_id: &str) -> Option<&Argument> {
        self.arguments().find(|a| a.id == argument_id)
    }

    /// Every argument across all rounds, in submission order
    pub fn arguments(&self) -> impl Iterator<Item = &Argument> {
        self.rounds.iter().flat_map(|r| r.arguments.iter())
    }

    /// Status with `completed` resolved to the outcome it preserved
    pub fn final_status(&self) -> DebateStatus {
        match (self.status, self.outcome) {
            (DebateStatus::Completed, Some(outcome)) => outcome,
            (status, _) => status,
        }
    }

    /// Metrics of the most recently evaluated round
    pub fn latest_metrics(&self) -> Option<&ConsensusMetrics> {
        self.rounds.iter().rev().find_map(|r| r.metrics.as_ref())
    }

    /// One-line summary for logs
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | {} arguments | topic={}",
            self.status,
            self.current_round,
            self.max_rounds,
            self.arguments().count(),
            self.topic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn debate() -> Debate {
        Debate::new("d-1", "Q3 launch", "", "alice", "bob", 3, 0.8)
    }

    #[test]
    fn test_permitted_next_table() {
        assert_eq!(ArgumentType::permitted_next(None), &[ArgumentType::Proposal]);
        assert_eq!(
            ArgumentType::permitted_next(Some(ArgumentType::Defense)),
            &[ArgumentType::Counter, ArgumentType::Resolution]
        );
        assert!(ArgumentType::permitted_next(Some(ArgumentType::Resolution)).is_empty());
        assert!(ArgumentType::Resolution.closes_round());
        assert!(ArgumentType::Counter.is_adversarial());
    }

    #[test]
    fn test_valid_lifecycle() {
        let mut d = debate();
        d.transition(DebateStatus::InProgress, "started").unwrap();
        d.transition(DebateStatus::ConsensusReached, "agreed").unwrap();
        assert!(d.ended_at.is_some());
        d.transition(DebateStatus::Completed, "archived").unwrap();

        assert_eq!(d.status, DebateStatus::Completed);
        assert_eq!(d.outcome, Some(DebateStatus::ConsensusReached));
        assert_eq!(d.final_status(), DebateStatus::ConsensusReached);
        assert_eq!(d.transitions.len(), 3);
        assert_eq!(d.transitions[0].from, DebateStatus::Pending);
    }

    #[test]
    fn test_invalid_transition() {
        let mut d = debate();
        let err = d.transition(DebateStatus::Deadlocked, "skip").unwrap_err();
        assert_eq!(err.from, DebateStatus::Pending);
        assert!(d.transitions.is_empty());

        d.transition(DebateStatus::Terminated, "cancelled").unwrap();
        assert!(d.transition(DebateStatus::InProgress, "restart").is_err());
    }

    #[test]
    fn test_rounds_and_participants() {
        let mut d = debate();
        assert!(d.active_round().is_none());
        assert_eq!(d.open_round().round_number, 1);
        assert_eq!(d.current_round, 1);
        assert!(d.active_round().is_some());

        assert!(d.is_participant("bob"));
        assert!(!d.is_participant("mallory"));
        assert_eq!(d.opponent_of("alice"), Some("bob"));
        assert_eq!(d.opponent_of("mallory"), None);

        if let Some(round) = d.active_round_mut() {
            round.ended_at = Some(Utc::now());
        }
        assert!(d.active_round().is_none());
    }

    #[test]
    fn test_evidence_defaults_and_clamp() {
        let parsed: Evidence =
            serde_json::from_value(json!({"type": "survey", "content": {"n": 400}})).unwrap();
        assert!((parsed.confidence - 0.8).abs() < f64::EPSILON);
        assert!(!parsed.evidence_id.is_empty());

        let e = Evidence::new("report", "Gartner", json!("growth")).with_confidence(1.7);
        assert!((e.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(serde_json::to_value(&e).unwrap()["type"], "report");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DebateStatus::ConsensusReached.to_string(), "consensus_reached");
        assert_eq!(
            serde_json::to_value(DebateStatus::InProgress).unwrap(),
            json!("in_progress")
        );
        assert!(DebateStatus::Failed.is_terminal());
        assert!(!DebateStatus::Completed.is_outcome());
    }

    #[test]
    fn test_status_line() {
        let mut d = debate();
        d.transition(DebateStatus::InProgress, "started").unwrap();
        d.open_round();
        let line = d.status_line();
        assert!(line.contains("[in_progress]"));
        assert!(line.contains("round 1/3"));
    }
}
