// ============================================================
// Layer 5 — Learning Rate Schedule
// ============================================================
// Linear warmup followed by linear decay to zero:
//
//   lr
//   ▲      /‾‾\
//   │     /    ‾‾\
//   │    /        ‾‾\
//   │   /            ‾‾\
//   └──┴──────┴─────────┴──► step
//      0    warmup     total
//
// The state (`step`) is serialisable so a resumed run picks up
// the learning rate exactly where it stopped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupLinearSchedule {
    pub base_lr:      f64,
    pub warmup_steps: usize,
    pub total_steps:  usize,
    pub step:         usize,
}

impl WarmupLinearSchedule {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self { base_lr, warmup_steps, total_steps, step: 0 }
    }

    /// Derive the step counts from the training budget.
    ///
    /// `steps_per_epoch = ceil(max_samples / batch_size)`,
    /// `warmup = floor(warmup_pct * total)`.
    pub fn from_training(
        base_lr:     f64,
        max_samples: usize,
        batch_size:  usize,
        num_epochs:  usize,
        warmup_pct:  f64,
    ) -> Self {
        let steps_per_epoch = max_samples.div_ceil(batch_size.max(1));
        let total = steps_per_epoch * num_epochs;
        let warmup = (warmup_pct * total as f64).floor() as usize;
        Self::new(base_lr, warmup, total)
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let span = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.base_lr * (remaining / span).max(0.0)
    }

    pub fn current_lr(&self) -> f64 {
        self.lr_at(self.step)
    }

    pub fn step(&mut self) {
        self.step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_counts_follow_the_budget() {
        let s = WarmupLinearSchedule::from_training(3e-5, 6000, 8, 100, 0.1);
        assert_eq!(s.total_steps, 75_000);
        assert_eq!(s.warmup_steps, 7_500);

        let s = WarmupLinearSchedule::from_training(1.0, 10, 3, 2, 0.1);
        assert_eq!(s.total_steps, 8);
        assert_eq!(s.warmup_steps, 0);
    }

    #[test]
    fn warmup_rises_linearly_then_decays_to_zero() {
        let s = WarmupLinearSchedule::new(1.0, 10, 110);
        assert_eq!(s.lr_at(0), 0.0);
        assert!((s.lr_at(5) - 0.5).abs() < 1e-12);
        assert!((s.lr_at(10) - 1.0).abs() < 1e-12);
        assert!((s.lr_at(60) - 0.5).abs() < 1e-12);
        assert_eq!(s.lr_at(110), 0.0);
        assert_eq!(s.lr_at(500), 0.0);
    }

    #[test]
    fn no_warmup_starts_at_base() {
        let s = WarmupLinearSchedule::new(2.0, 0, 4);
        assert_eq!(s.lr_at(0), 2.0);
        assert_eq!(s.lr_at(2), 1.0);
    }

    #[test]
    fn stepping_and_state_round_trip() {
        let mut s = WarmupLinearSchedule::new(1.0, 2, 4);
        s.step();
        assert!((s.current_lr() - 0.5).abs() < 1e-12);
        let json = serde_json::to_string(&s).unwrap();
        let back: WarmupLinearSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
