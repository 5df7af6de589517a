//! Plateau learning-rate scheduling
//!
//! Halves the learning rate whenever the validation loss has not improved
//! for `patience` consecutive epochs, never dropping below `min_lr`.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Multiplicative factor applied on plateau
const DEFAULT_FACTOR: f64 = 0.5;

/// Epochs of stagnation tolerated before a reduction
const DEFAULT_PATIENCE: usize = 2;

/// Reduce-on-plateau scheduler state (minimize mode)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceOnPlateau {
    lr: f64,
    best_loss: f64,
    stagnant: usize,
    factor: f64,
    patience: usize,
    min_lr: f64,
}

impl ReduceOnPlateau {
    pub fn new(initial_lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            lr: initial_lr,
            best_loss: f64::INFINITY,
            stagnant: 0,
            factor,
            patience,
            min_lr,
        }
    }

    /// Standard schedule for a run: halve after two stagnant epochs, floor
    /// at a thousandth of the initial rate.
    pub fn for_run(initial_lr: f64) -> Self {
        Self::new(initial_lr, DEFAULT_FACTOR, DEFAULT_PATIENCE, initial_lr * 1e-3)
    }

    /// Record one epoch's validation loss and return the rate to use next.
    pub fn step(&mut self, val_loss: f64) -> f64 {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.stagnant = 0;
        } else {
            self.stagnant += 1;
            if self.stagnant > self.patience {
                let reduced = (self.lr * self.factor).max(self.min_lr);
                if reduced < self.lr {
                    info!("Reducing learning rate: {:.2e} -> {:.2e}", self.lr, reduced);
                    self.lr = reduced;
                }
                self.stagnant = 0;
            }
        }
        self.lr
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.lr
    }
}
