//! Training module for supervised defect segmentation
//!
//! This module provides:
//! - The `Trainer` orchestrator (epoch/phase loop, gradient accumulation,
//!   checkpointing, run logging)
//! - Loss strategies with their channel-layout contracts
//! - Optimizer selection by name
//! - Cutmix region-swap augmentation
//! - Plateau learning-rate scheduling

pub mod checkpoint;
pub mod config;
pub mod cutmix;
pub mod loss;
pub mod optim;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::CheckpointMeta;
pub use config::TrainerConfig;
pub use cutmix::CUTMIX_ALPHA;
pub use loss::{ChannelLayout, Criterion, LossKind};
pub use optim::{OptimizerKind, SegOptimizer};
pub use scheduler::ReduceOnPlateau;
pub use trainer::{RunState, Trainer};

use serde::{Deserialize, Serialize};

/// Training phase: determines whether gradients are computed and applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 50;

/// Default per-iteration batch size
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 5e-4;
