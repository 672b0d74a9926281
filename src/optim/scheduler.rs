//! Learning rate scheduling.

use super::Optimizer;
use std::collections::BTreeMap;

/// Learning rate scheduler trait.
pub trait LRScheduler {
    /// Get the current learning rate.
    fn get_lr(&self) -> f32;

    /// Advance to the next epoch.
    fn step(&mut self);
}

/// Piecewise-constant schedule keyed by epoch.
///
/// The configured map gives the rate that takes effect at each keyed epoch;
/// between keys the last rate holds. Epochs are one-indexed to match the
/// training loop, and a schedule keyed from epoch 0 behaves identically.
pub struct PiecewiseLR {
    schedule: BTreeMap<usize, f32>,
    current_epoch: usize,
}

impl PiecewiseLR {
    /// Build a schedule from the configured epoch → rate map.
    pub fn new(schedule: BTreeMap<usize, f32>) -> Self {
        Self { schedule, current_epoch: 1 }
    }

    /// The rate in effect at a given epoch: the entry with the greatest
    /// key not above `epoch`, or the earliest entry before any key.
    pub fn lr_for_epoch(&self, epoch: usize) -> f32 {
        self.schedule
            .range(..=epoch)
            .next_back()
            .or_else(|| self.schedule.iter().next())
            .map(|(_, &lr)| lr)
            .unwrap_or(0.0)
    }

    /// Jump the scheduler to an epoch (checkpoint resume).
    pub fn set_epoch(&mut self, epoch: usize) {
        self.current_epoch = epoch;
    }

    /// Apply the current rate to an optimizer.
    pub fn apply<O: Optimizer>(&self, optimizer: &mut O) {
        optimizer.set_lr(self.get_lr());
    }
}

impl LRScheduler for PiecewiseLR {
    fn get_lr(&self) -> f32 {
        self.lr_for_epoch(self.current_epoch)
    }

    fn step(&mut self) {
        self.current_epoch += 1;
    }
}
