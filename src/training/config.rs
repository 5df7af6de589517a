//! Trainer Configuration
//!
//! Defines the run-level configuration handed to the `Trainer`. Selectors
//! (loss kind, optimizer kind) are closed enumerations parsed up front, so an
//! unknown name fails at configuration time rather than mid-run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SteelSegError};

use super::loss::LossKind;
use super::optim::OptimizerKind;

/// Configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Loss strategy selector
    pub loss: LossKind,

    /// Optimizer strategy selector
    pub optimizer: OptimizerKind,

    /// Initial learning rate (the plateau scheduler may lower it)
    pub learning_rate: f64,

    /// Per-iteration batch size
    pub batch_size: usize,

    /// Simulated large batch size; gradients are accumulated over
    /// `effective_batch_size / batch_size` iterations before each step
    pub effective_batch_size: usize,

    /// Run name, used as the checkpoint and log filename stem
    pub run_name: String,

    /// Whether to apply cutmix augmentation during the train phase
    pub cutmix: bool,

    /// Random seed for augmentation and shuffling
    pub seed: u64,

    /// Directory for checkpoints
    pub checkpoint_dir: PathBuf,

    /// Directory for per-run CSV logs
    pub log_dir: PathBuf,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            loss: LossKind::BceDice,
            optimizer: OptimizerKind::Adam,
            learning_rate: super::DEFAULT_LEARNING_RATE,
            batch_size: super::DEFAULT_BATCH_SIZE,
            effective_batch_size: super::DEFAULT_BATCH_SIZE * 4,
            run_name: "resnet_unet_bcedice".to_string(),
            cutmix: true,
            seed: 42,
            checkpoint_dir: PathBuf::from("models"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl TrainerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(SteelSegError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(SteelSegError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.effective_batch_size < self.batch_size
            || self.effective_batch_size % self.batch_size != 0
        {
            return Err(SteelSegError::Config(format!(
                "effective_batch_size ({}) must be a positive multiple of batch_size ({})",
                self.effective_batch_size, self.batch_size
            )));
        }
        if self.run_name.is_empty() {
            return Err(SteelSegError::Config("run_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Number of iterations to accumulate gradients over before each
    /// optimizer step. Always >= 1 for a valid configuration.
    pub fn accumulation_steps(&self) -> usize {
        self.effective_batch_size / self.batch_size
    }
}
