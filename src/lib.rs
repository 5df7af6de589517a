//! # steelseg
//!
//! A Rust library for training steel surface defect segmentation models
//! using the Burn framework.
//!
//! ## Features
//!
//! - **Supervised training loop** with gradient accumulation for simulated
//!   large-batch training on limited memory
//! - **Cutmix augmentation** (region-swap mixing of image/mask pairs)
//! - **Plateau learning-rate scheduling** driven by validation loss
//! - **Best-checkpoint persistence** keyed on validation Dice
//!
//! ## Modules
//!
//! - `dataset`: image/mask loading, batching, and the batch-provider seam
//! - `model`: U-Net style encoder/decoder architecture built with Burn
//! - `training`: the `Trainer` orchestrator, loss strategies, optimizer
//!   selection, cutmix, scheduling, and checkpointing
//! - `utils`: logging, segmentation metrics, and run reports
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use steelseg::backend::TrainingBackend;
//! use steelseg::model::{UNet, UNetConfig};
//! use steelseg::training::{Trainer, TrainerConfig};
//!
//! let device = steelseg::backend::default_device();
//! let model = UNet::<TrainingBackend>::new(&UNetConfig::new(), &device);
//! let config = TrainerConfig::default();
//! // ... providers, then Trainer::new(...)?.fit(epochs)?
//! ```

pub mod backend;
pub mod dataset;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    BatchProvider, DiskBatchProvider, InMemoryProvider, SegBatch, SegBatcher, SegDataset, SegItem,
};
pub use error::{Result, SteelSegError};
pub use model::{UNet, UNetConfig};
pub use training::loss::{ChannelLayout, Criterion, LossKind};
pub use training::optim::OptimizerKind;
pub use training::{Phase, RunState, Trainer, TrainerConfig};
pub use utils::metrics::{EpochScores, SegmentationMeter};

/// Number of defect classes in the Severstal steel dataset
pub const NUM_DEFECT_CLASSES: usize = 4;

/// Default crop height used during training
pub const DEFAULT_IMAGE_HEIGHT: usize = 256;

/// Default crop width used during training
pub const DEFAULT_IMAGE_WIDTH: usize = 256;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
