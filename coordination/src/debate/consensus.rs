//! Consensus evaluation: per-round metrics from swappable evaluators.
//!
//! The engine only reads `agreement_score`; the other dimensions are
//! recorded for observers and the knowledge base.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scoring::tag_impact_areas;
use super::state::{ArgumentType, Debate, DebateRound};

/// Scores computed when a round closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMetrics {
    /// Sole trigger for `consensus_reached`.
    pub agreement_score: f64,
    pub resolution_quality: f64,
    pub evidence_strength: f64,
    pub implementation_feasibility: f64,
    /// Impact area → share of adversarial arguments raising it
    pub risk_assessment: BTreeMap<String, f64>,
    pub evaluated_at: DateTime<Utc>,
}

impl ConsensusMetrics {
    pub fn meets(&self, threshold: f64) -> bool {
        self.agreement_score >= threshold
    }
}

/// What an evaluator sees: the debate and the round being closed.
#[derive(Debug, Clone, Copy)]
pub struct RoundView<'a> {
    pub debate: &'a Debate,
    pub round: &'a DebateRound,
}

impl<'a> RoundView<'a> {
    pub fn new(debate: &'a Debate, round: &'a DebateRound) -> Self {
        Self { debate, round }
    }

    /// The resolution that closed the round
    pub fn resolution(&self) -> Option<&'a super::state::Argument> {
        self.round.arguments_of(ArgumentType::Resolution).last()
    }

    fn resolution_number(&self, field: &str) -> Option<f64> {
        self.resolution()
            .and_then(|r| r.content.get(field))
            .and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("{dimension} evaluator failed: {message}")]
    Failed {
        dimension: &'static str,
        message: String,
    },

    #[error("{dimension} evaluator returned non-finite score {value}")]
    InvalidScore { dimension: &'static str, value: f64 },
}

impl EvaluationError {
    pub fn failed(dimension: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            dimension,
            message: message.into(),
        }
    }
}

/// Produces one scalar dimension in `[0, 1]`
pub trait ScoreEvaluator: Send + Sync {
    fn score(&self, view: &RoundView<'_>) -> Result<f64, EvaluationError>;
}

impl<F> ScoreEvaluator for F
where
    F: Fn(&RoundView<'_>) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn score(&self, view: &RoundView<'_>) -> Result<f64, EvaluationError> {
        self(view)
    }
}

/// Produces the risk breakdown
pub trait RiskEvaluator: Send + Sync {
    fn assess(&self, view: &RoundView<'_>) -> Result<BTreeMap<String, f64>, EvaluationError>;
}

impl<F> RiskEvaluator for F
where
    F: Fn(&RoundView<'_>) -> Result<BTreeMap<String, f64>, EvaluationError> + Send + Sync,
{
    fn assess(&self, view: &RoundView<'_>) -> Result<BTreeMap<String, f64>, EvaluationError> {
        self(view)
    }
}

/// Pin a closure to the evaluator signature
pub fn score_fn<F>(f: F) -> F
where
    F: Fn(&RoundView<'_>) -> Result<f64, EvaluationError> + Send + Sync,
{
    f
}

/// Pin a closure to the risk evaluator signature
pub fn risk_fn<F>(f: F) -> F
where
    F: Fn(&RoundView<'_>) -> Result<BTreeMap<String, f64>, EvaluationError> + Send + Sync,
{
    f
}

/// Evaluator that always returns the same score
#[derive(Debug, Clone, Copy)]
pub struct FixedScore(pub f64);

impl ScoreEvaluator for FixedScore {
    fn score(&self, _view: &RoundView<'_>) -> Result<f64, EvaluationError> {
        Ok(self.0)
    }
}

pub type SharedScoreEvaluator = Arc<dyn ScoreEvaluator>;
pub type SharedRiskEvaluator = Arc<dyn RiskEvaluator>;

/// The five evaluators consulted when a round closes.
#[derive(Clone)]
pub struct EvaluatorSet {
    agreement: SharedScoreEvaluator,
    resolution_quality: SharedScoreEvaluator,
    evidence_strength: SharedScoreEvaluator,
    feasibility: SharedScoreEvaluator,
    risk: SharedRiskEvaluator,
}

impl EvaluatorSet {
    pub fn standard() -> Self {
        Self {
            agreement: Arc::new(standard_agreement),
            resolution_quality: Arc::new(standard_resolution_quality),
            evidence_strength: Arc::new(standard_evidence_strength),
            feasibility: Arc::new(standard_feasibility),
            risk: Arc::new(standard_risk),
        }
    }

    pub fn with_agreement(mut self, evaluator: impl ScoreEvaluator + 'static) -> Self {
        self.agreement = Arc::new(evaluator);
        self
    }

    pub fn with_resolution_quality(mut self, evaluator: impl ScoreEvaluator + 'static) -> Self {
        self.resolution_quality = Arc::new(evaluator);
        self
    }

    pub fn with_evidence_strength(mut self, evaluator: impl ScoreEvaluator + 'static) -> Self {
        self.evidence_strength = Arc::new(evaluator);
        self
    }

    pub fn with_feasibility(mut self, evaluator: impl ScoreEvaluator + 'static) -> Self {
        self.feasibility = Arc::new(evaluator);
        self
    }

    pub fn with_risk(mut self, evaluator: impl RiskEvaluator + 'static) -> Self {
        self.risk = Arc::new(evaluator);
        self
    }

    /// Run every evaluator; the first error aborts the evaluation
    pub fn evaluate(&self, view: &RoundView<'_>) -> Result<ConsensusMetrics, EvaluationError> {
        let mut risk_assessment = BTreeMap::new();
        for (area, share) in self.risk.assess(view)? {
            risk_assessment.insert(area, checked("risk", share)?);
        }

        Ok(ConsensusMetrics {
            agreement_score: checked("agreement", self.agreement.score(view)?)?,
            resolution_quality: checked("resolution_quality", self.resolution_quality.score(view)?)?,
            evidence_strength: checked("evidence_strength", self.evidence_strength.score(view)?)?,
            implementation_feasibility: checked("feasibility", self.feasibility.score(view)?)?,
            risk_assessment,
            evaluated_at: Utc::now(),
        })
    }
}

impl Default for EvaluatorSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for EvaluatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorSet").finish_non_exhaustive()
    }
}

fn checked(dimension: &'static str, value: f64) -> Result<f64, EvaluationError> {
    if value.is_finite() {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(EvaluationError::InvalidScore { dimension, value })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

// ── Standard evaluators ─────────────────────────────────────────────

/// Explicit `agreement` in the resolution, else weighted confidences.
///
/// Resolution confidence weighs 0.6 and mean defense confidence 0.4; a
/// counter in the round costs 0.1.
pub fn standard_agreement(view: &RoundView<'_>) -> Result<f64, EvaluationError> {
    if let Some(explicit) = view.resolution_number("agreement") {
        return Ok(explicit);
    }
    let resolution = view
        .resolution()
        .map(|r| r.confidence)
        .ok_or_else(|| EvaluationError::failed("agreement", "round has no resolution"))?;
    let defense = mean(
        view.round
            .arguments_of(ArgumentType::Defense)
            .map(|a| a.confidence),
    )
    .unwrap_or(0.0);
    let penalty = if view.round.arguments_of(ArgumentType::Counter).next().is_some() {
        0.1
    } else {
        0.0
    };
    Ok(0.6 * resolution + 0.4 * defense - penalty)
}

/// Resolution confidence, plus credit for citing and for structure
pub fn standard_resolution_quality(view: &RoundView<'_>) -> Result<f64, EvaluationError> {
    let Some(resolution) = view.resolution() else {
        return Ok(0.0);
    };
    let cites = if resolution.references.is_empty() { 0.0 } else { 0.25 };
    let structure = resolution.content.len().min(4) as f64 / 4.0;
    Ok(0.5 * resolution.confidence + cites + 0.25 * structure)
}

/// Mean confidence of all evidence attached in the round
pub fn standard_evidence_strength(view: &RoundView<'_>) -> Result<f64, EvaluationError> {
    Ok(mean(
        view.round
            .arguments
            .iter()
            .flat_map(|a| a.evidence.iter())
            .map(|e| e.confidence),
    )
    .unwrap_or(0.0))
}

/// Explicit `feasibility` in the resolution, else derived from risk
pub fn standard_feasibility(view: &RoundView<'_>) -> Result<f64, EvaluationError> {
    if let Some(explicit) = view.resolution_number("feasibility") {
        return Ok(explicit);
    }
    let worst = standard_risk(view)?
        .values()
        .copied()
        .fold(0.0_f64, f64::max);
    Ok(1.0 - 0.5 * worst)
}

/// Share of challenge and counter arguments tagged with each impact area
pub fn standard_risk(view: &RoundView<'_>) -> Result<BTreeMap<String, f64>, EvaluationError> {
    let adversarial: Vec<_> = view
        .round
        .arguments
        .iter()
        .filter(|a| a.argument_type.is_adversarial())
        .collect();
    if adversarial.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for argument in &adversarial {
        let areas = if argument.impact_areas.is_empty() {
            tag_impact_areas(&argument.content)
        } else {
            argument.impact_areas.clone()
        };
        for area in areas {
            *counts.entry(area).or_default() += 1;
        }
    }

    let total = adversarial.len() as f64;
    Ok(counts
        .into_iter()
        .map(|(area, n)| (area, n as f64 / total))
        .collect())
}
