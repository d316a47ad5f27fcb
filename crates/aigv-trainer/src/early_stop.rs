//! Early stopping with signed improvement threshold.
//!
//! A score stalls when `score < best - delta`. With a negative delta the
//! score has to beat the best by at least `|delta|` to count as an
//! improvement. The stopper triggers once `counter` reaches `patience`.
//! [`EarlyStopping::restart`] resets the best score and counter and installs
//! a new delta; the training loop calls it after every learning-rate decay.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of observing one validation score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopDecision {
    /// New best score; the caller saves the `best` checkpoint.
    Improved { best: f64 },
    /// No improvement; patience not yet exhausted.
    Stalled { counter: usize },
    /// Patience exhausted.
    Triggered,
}

/// Stall tracker for one learning-rate phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    patience: usize,
    delta: f64,
    best_score: Option<f64>,
    counter: usize,
    triggered: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize, delta: f64) -> Self {
        Self {
            patience,
            delta,
            best_score: None,
            counter: 0,
            triggered: false,
        }
    }

    /// Restore a tracker from persisted counters.
    pub fn resume(patience: usize, delta: f64, best_score: Option<f64>, counter: usize) -> Self {
        Self {
            patience,
            delta,
            best_score,
            counter,
            triggered: counter >= patience,
        }
    }

    pub fn observe(&mut self, score: f64) -> StopDecision {
        let decision = match self.best_score {
            Some(best) if score < best - self.delta => {
                self.counter += 1;
                if self.counter >= self.patience {
                    self.triggered = true;
                    StopDecision::Triggered
                } else {
                    StopDecision::Stalled {
                        counter: self.counter,
                    }
                }
            }
            _ => {
                self.best_score = Some(score);
                self.counter = 0;
                StopDecision::Improved { best: score }
            }
        };
        debug!(score, ?decision, delta = self.delta, "Early stopping observed score");
        decision
    }

    /// Start a fresh phase with a new delta.
    pub fn restart(&mut self, delta: f64) {
        self.delta = delta;
        self.best_score = None;
        self.counter = 0;
        self.triggered = false;
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_score_is_best() {
        let mut stopper = EarlyStopping::new(3, -0.001);
        assert_eq!(stopper.observe(0.7), StopDecision::Improved { best: 0.7 });
        assert_eq!(stopper.best_score(), Some(0.7));
    }

    #[test]
    fn test_small_gain_counts_as_stall() {
        let mut stopper = EarlyStopping::new(3, -0.001);
        stopper.observe(0.7);
        assert_eq!(stopper.observe(0.7005), StopDecision::Stalled { counter: 1 });
        assert!(matches!(stopper.observe(0.702), StopDecision::Improved { .. }));
        assert_eq!(stopper.counter(), 0);
    }

    #[test]
    fn test_triggers_at_patience() {
        let mut stopper = EarlyStopping::new(2, -0.001);
        stopper.observe(0.9);
        assert_eq!(stopper.observe(0.8), StopDecision::Stalled { counter: 1 });
        assert_eq!(stopper.observe(0.8), StopDecision::Triggered);
        assert!(stopper.is_triggered());
    }

    #[test]
    fn test_restart_resets_and_tightens() {
        let mut stopper = EarlyStopping::new(1, -0.001);
        stopper.observe(0.9);
        assert_eq!(stopper.observe(0.5), StopDecision::Triggered);

        stopper.restart(-0.002);
        assert!(!stopper.is_triggered());
        assert_eq!(stopper.counter(), 0);
        assert_eq!(stopper.best_score(), None);
        assert_eq!(stopper.delta(), -0.002);

        // Lower than the old best, but the new phase starts from scratch
        assert_eq!(stopper.observe(0.5), StopDecision::Improved { best: 0.5 });
        // 0.5015 falls short of the tighter threshold
        assert_eq!(stopper.observe(0.5015), StopDecision::Triggered);
    }

    #[test]
    fn test_positive_delta_tolerates_small_drops() {
        let mut stopper = EarlyStopping::new(2, 0.05);
        stopper.observe(0.8);
        assert!(matches!(stopper.observe(0.76), StopDecision::Improved { .. }));
        assert_eq!(stopper.best_score(), Some(0.76));
    }
}
