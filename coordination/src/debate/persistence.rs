//! Debate checkpoints
//!
//! A checkpoint is a versioned JSON snapshot of one debate. Every restore
//! path audits it first so a damaged snapshot never re-enters an engine.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{Debate, DebateStatus};

/// Snapshot of one debate at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateCheckpoint {
    pub version: u32,
    pub debate: Debate,
    /// Why the snapshot was taken, e.g. `shutdown`
    pub reason: String,
    /// Issued by the engine, increasing per engine
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl DebateCheckpoint {
    /// Newest layout this build reads and writes
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(debate: &Debate, reason: &str, sequence: u64) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            debate: debate.clone(),
            reason: reason.to_string(),
            sequence,
            created_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self).map_err(|e| PersistenceError::Encode(e.to_string()))
    }

    /// Parse without auditing; layouts newer than this build are refused
    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let parsed: Self =
            serde_json::from_str(json).map_err(|e| PersistenceError::Decode(e.to_string()))?;
        if parsed.version > Self::CURRENT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: parsed.version,
                supported: Self::CURRENT_VERSION,
            });
        }
        Ok(parsed)
    }

    /// Audit the snapshot; corrupted snapshots are an error
    pub fn verify(&self) -> Result<IntegrityStatus, PersistenceError> {
        match validate_checkpoint(self) {
            IntegrityStatus::Corrupted { errors } => Err(PersistenceError::Corrupted(errors)),
            usable => Ok(usable),
        }
    }

    /// Parse and audit in one step
    pub fn restore(json: &str) -> Result<(Self, IntegrityStatus), PersistenceError> {
        let checkpoint = Self::from_json(json)?;
        let status = checkpoint.verify()?;
        Ok((checkpoint, status))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Failed to encode checkpoint: {0}")]
    Encode(String),

    #[error("Failed to decode checkpoint: {0}")]
    Decode(String),

    #[error("Checkpoint layout v{found} is newer than supported v{supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Checkpoint is corrupted: {}", .0.join("; "))]
    Corrupted(Vec<String>),

    #[error("Debate {debate_id} is already live in this engine")]
    AlreadyLive { debate_id: String },
}

/// Outcome of auditing a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Valid,
    /// Usable, with oddities worth logging
    Recoverable { warnings: Vec<String> },
    /// Must not be restored
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    pub fn can_resume(&self) -> bool {
        !matches!(self, Self::Corrupted { .. })
    }
}

#[derive(Default)]
struct Audit {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Audit {
    fn require(&mut self, holds: bool, problem: impl FnOnce() -> String) {
        if !holds {
            self.errors.push(problem());
        }
    }

    fn note(&mut self, holds: bool, oddity: impl FnOnce() -> String) {
        if !holds {
            self.warnings.push(oddity());
        }
    }

    fn finish(self) -> IntegrityStatus {
        if !self.errors.is_empty() {
            IntegrityStatus::Corrupted {
                errors: self.errors,
            }
        } else if !self.warnings.is_empty() {
            IntegrityStatus::Recoverable {
                warnings: self.warnings,
            }
        } else {
            IntegrityStatus::Valid
        }
    }
}

/// Check a snapshot's internal consistency.
///
/// Errors cover anything the engine relies on: round bookkeeping, the
/// threshold range, an open round while in progress, a status that matches
/// the transition history, and argument ownership. Arguments from outsiders,
/// dangling references and closed rounds without metrics are warnings.
pub fn validate_checkpoint(checkpoint: &DebateCheckpoint) -> IntegrityStatus {
    let debate = &checkpoint.debate;
    let mut audit = Audit::default();

    audit.require(checkpoint.version <= DebateCheckpoint::CURRENT_VERSION, || {
        format!("unsupported layout v{}", checkpoint.version)
    });
    audit.require(debate.current_round <= debate.max_rounds, || {
        format!(
            "round {} is past the limit of {}",
            debate.current_round, debate.max_rounds
        )
    });
    audit.require(debate.rounds.len() == debate.current_round as usize, || {
        format!(
            "current_round is {} but {} rounds are recorded",
            debate.current_round,
            debate.rounds.len()
        )
    });
    audit.require((0.0..=1.0).contains(&debate.consensus_threshold), || {
        format!("threshold {} is outside [0, 1]", debate.consensus_threshold)
    });

    match debate.status {
        DebateStatus::InProgress => audit.require(debate.active_round().is_some(), || {
            "in_progress without an open round".to_string()
        }),
        DebateStatus::Pending => audit.require(debate.rounds.is_empty(), || {
            "pending but rounds were already opened".to_string()
        }),
        _ => {}
    }

    let recorded = debate.transitions.last().map(|t| t.to);
    audit.require(
        recorded == Some(debate.status)
            || (recorded.is_none() && debate.status == DebateStatus::Pending),
        || match recorded {
            Some(to) => format!("status {} but history ends at {}", debate.status, to),
            None => format!("status {} with no history", debate.status),
        },
    );

    let mut earlier: HashSet<&str> = HashSet::new();
    for argument in debate.arguments() {
        audit.require(argument.debate_id == debate.id, || {
            format!("argument {} is filed under {}", argument.id, argument.debate_id)
        });
        audit.note(debate.is_participant(&argument.agent_id), || {
            format!("argument {} came from outsider {}", argument.id, argument.agent_id)
        });
        for reference in &argument.references {
            audit.note(earlier.contains(reference.as_str()), || {
                format!("argument {} cites unknown {}", argument.id, reference)
            });
        }
        earlier.insert(&argument.id);
    }

    for round in &debate.rounds {
        audit.note(!round.is_closed() || round.metrics.is_some(), || {
            format!("round {} closed without metrics", round.round_number)
        });
    }

    audit.finish()
}
