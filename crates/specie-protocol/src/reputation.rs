//! Witness reputation: a bounded score in [0, 100] with importance
//! weighting and asymmetric penalties.
//!
//! Gains shrink as the score rises (new witnesses climb fast); penalties
//! are twice as steep as gains at equal importance and grow with the
//! current score, so a high-reputation witness has the most to lose.

use serde::{Deserialize, Serialize};

use specie_core::types::{constants, Timestamp};

/// Outcome of a single scored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// One recorded score change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationChange {
    pub timestamp: Timestamp,
    pub outcome: Outcome,
    pub importance: f64,
    pub delta: f64,
    pub score: f64,
}

/// A witness's reputation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    pub score: f64,
    pub successful: u64,
    pub failed: u64,
    pub last_updated: Timestamp,
    pub history: Vec<ReputationChange>,
}

impl Reputation {
    /// Fresh reputation at the initial score of 100.
    pub fn new() -> Self {
        Self {
            score: constants::INITIAL_REPUTATION,
            successful: 0,
            failed: 0,
            last_updated: 0,
            history: Vec::new(),
        }
    }

    /// Seed a reputation with a synthetic starting point (used when
    /// bootstrapping a roster with plausible histories).
    pub fn with_score(score: f64, successful: u64, failed: u64) -> Self {
        Self {
            score: score.clamp(constants::REPUTATION_FLOOR, constants::REPUTATION_CAP),
            successful,
            failed,
            last_updated: 0,
            history: Vec::new(),
        }
    }

    /// Record a successful event: Δ = importance · (0.5 + (100 − score)/200),
    /// clamped to the cap. Returns the new score.
    pub fn record_success(&mut self, importance: f64, now: Timestamp) -> f64 {
        let delta = importance * (0.5 + (constants::REPUTATION_CAP - self.score) / 200.0);
        self.score = (self.score + delta).min(constants::REPUTATION_CAP);
        self.successful += 1;
        self.push_change(Outcome::Success, importance, delta, now);
        self.score
    }

    /// Record a failure: Δ = importance · (0.5 + score/200), applied at
    /// double weight and clamped to the floor. Returns the new score.
    pub fn record_failure(&mut self, importance: f64, now: Timestamp) -> f64 {
        let delta = importance * (0.5 + self.score / 200.0);
        self.score = (self.score - 2.0 * delta).max(constants::REPUTATION_FLOOR);
        self.failed += 1;
        self.push_change(Outcome::Failure, importance, -2.0 * delta, now);
        self.score
    }

    fn push_change(&mut self, outcome: Outcome, importance: f64, delta: f64, now: Timestamp) {
        self.last_updated = now;
        self.history.push(ReputationChange {
            timestamp: now,
            outcome,
            importance,
            delta,
            score: self.score,
        });
        let cap = constants::REPUTATION_HISTORY_CAP;
        if self.history.len() > cap {
            let drop = self.history.len() - cap;
            self.history.drain(..drop);
        }
    }
}

impl Default for Reputation {
    fn default() -> Self {
        Self::new()
    }
}
