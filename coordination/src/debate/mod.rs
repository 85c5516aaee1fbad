//! Debate engine: structured argument exchange between a primary and an
//! adversary agent, scored for consensus at the end of every round.
//!
//! # Round Flow
//!
//! ```text
//! Pending → InProgress ─┬─ Proposal → Challenge → Defense ─┬─ Resolution
//!    │                  │                                  └─ Counter → Resolution
//!    │                  │                                              │
//!    │                  │                          evaluate round ◄────┘
//!    │                  │                               │
//!    │                  │    agreement ≥ threshold ─────┼─→ ConsensusReached
//!    │                  │    last round ────────────────┼─→ Deadlocked
//!    │                  └─── otherwise next round ◄─────┘
//!    │                       evaluator error ───────────→ Failed
//!    └─ terminate at any point before an outcome → Terminated
//!
//! ConsensusReached | Deadlocked | Terminated | Failed → Completed (outcome kept)
//! ```

pub mod consensus;
pub mod engine;
pub mod persistence;
pub mod scoring;
pub mod state;

pub use consensus::{
    score_fn, risk_fn, ConsensusMetrics, EvaluationError, EvaluatorSet, FixedScore,
    RiskEvaluator, RoundView, ScoreEvaluator,
};
pub use engine::{DebateEngine, DebateSettings, SharedDebateEngine};
pub use persistence::{validate_checkpoint, DebateCheckpoint, IntegrityStatus, PersistenceError};
pub use state::{
    Argument, ArgumentType, Debate, DebateRound, DebateStatus, DebateTransition, Evidence,
    TransitionError,
};
