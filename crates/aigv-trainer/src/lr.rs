//! Learning-rate control: step decay for restarts and a warmup schedule.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Base learning rate with a refusal floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrController {
    current: f64,
    min_lr: f64,
    factor: f64,
    decays: u32,
}

impl LrController {
    pub fn new(initial: f64, min_lr: f64, factor: f64) -> Self {
        Self {
            current: initial,
            min_lr,
            factor,
            decays: 0,
        }
    }

    /// Controller restored from a checkpointed base rate.
    pub fn resume(current: f64, min_lr: f64, factor: f64, decays: u32) -> Self {
        Self {
            current,
            min_lr,
            factor,
            decays,
        }
    }

    /// Divide the base rate by the factor.
    ///
    /// Returns `false`, leaving the rate untouched, when the result would
    /// fall below `min_lr`.
    pub fn decay(&mut self) -> bool {
        let next = self.current / self.factor;
        // Relative slack so 1e-5 / 10 still counts as reaching a 1e-6 floor
        if next < self.min_lr * (1.0 - 1e-9) {
            return false;
        }
        self.current = next;
        self.decays += 1;
        true
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn decays(&self) -> u32 {
        self.decays
    }
}

/// Linear warmup followed by cosine annealing, expressed as a function of
/// the epoch and the current base rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupCosine {
    warmup_epochs: usize,
    total_epochs: usize,
    eta_min: f64,
}

impl WarmupCosine {
    pub fn new(warmup_epochs: usize, total_epochs: usize, eta_min: f64) -> Self {
        Self {
            warmup_epochs,
            total_epochs,
            eta_min,
        }
    }

    /// Rate to train epoch `epoch` (0-based) with.
    ///
    /// Warmup epochs ramp `base/w, 2·base/w, …, base`; the remaining epochs
    /// anneal to `eta_min`, reaching it on the last epoch.
    pub fn lr_at(&self, epoch: usize, base: f64) -> f64 {
        let w = self.warmup_epochs;
        if epoch < w {
            return base * (epoch + 1) as f64 / w as f64;
        }

        let floor = self.eta_min.min(base);
        let span = self.total_epochs.saturating_sub(w);
        if span == 0 {
            return floor;
        }
        let progress = ((epoch + 1 - w) as f64 / span as f64).min(1.0);
        floor + (base - floor) * (1.0 + (PI * progress).cos()) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_divides_until_floor() {
        let mut lr = LrController::new(1e-4, 1e-6, 10.0);
        assert!(lr.decay());
        assert!((lr.current() - 1e-5).abs() < 1e-18);
        assert!(lr.decay());
        assert!((lr.current() - 1e-6).abs() < 1e-18);
        assert!(!lr.decay());
        assert!((lr.current() - 1e-6).abs() < 1e-18);
        assert_eq!(lr.decays(), 2);
    }

    #[test]
    fn test_warmup_rises_linearly() {
        let schedule = WarmupCosine::new(4, 10, 1e-6);
        let rates: Vec<f64> = (0..4).map(|e| schedule.lr_at(e, 1e-3)).collect();
        for (i, rate) in rates.iter().enumerate() {
            assert!((rate - 1e-3 * (i + 1) as f64 / 4.0).abs() < 1e-15);
        }
    }

    #[test]
    fn test_cosine_reaches_eta_min_at_last_epoch() {
        let schedule = WarmupCosine::new(3, 10, 1e-6);
        let last = schedule.lr_at(9, 1e-3);
        assert!((last - 1e-6).abs() < 1e-12);

        let mut previous = schedule.lr_at(2, 1e-3);
        for epoch in 3..10 {
            let rate = schedule.lr_at(epoch, 1e-3);
            assert!(rate < previous);
            previous = rate;
        }
    }

    #[test]
    fn test_schedule_follows_decayed_base() {
        let schedule = WarmupCosine::new(2, 10, 1e-7);
        let before = schedule.lr_at(5, 1e-3);
        let after = schedule.lr_at(5, 1e-4);
        assert!(after < before);
    }
}
