//! Optimizer selection
//!
//! Optimizers are selected by name from a closed list. The exotic Adam
//! variants map onto the two families Burn provides: plain Adam for the
//! coupled-decay names, AdamW for the decoupled-decay names (Over9000,
//! Ranger, Ralamb). An unknown name is a configuration error.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, AdamW, AdamWConfig, GradientsParams, Optimizer};
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SteelSegError};
use crate::model::UNet;

/// Decoupled weight decay applied by the AdamW-family selectors
const ADAMW_WEIGHT_DECAY: f32 = 0.01;

/// Optimizer selector, parsed from its configuration name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Over9000,
    Adam,
    RAdam,
    Ralamb,
    Ranger,
    LookaheadAdam,
}

impl OptimizerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizerKind::Over9000 => "over9000",
            OptimizerKind::Adam => "adam",
            OptimizerKind::RAdam => "radam",
            OptimizerKind::Ralamb => "ralamb",
            OptimizerKind::Ranger => "ranger",
            OptimizerKind::LookaheadAdam => "lookahead_adam",
        }
    }

    /// Build the optimizer for this selector.
    pub fn init<B: AutodiffBackend>(self) -> SegOptimizer<B> {
        match self {
            OptimizerKind::Adam | OptimizerKind::RAdam | OptimizerKind::LookaheadAdam => {
                SegOptimizer::Adam(AdamConfig::new().init())
            }
            OptimizerKind::Over9000 | OptimizerKind::Ranger | OptimizerKind::Ralamb => {
                SegOptimizer::AdamW(
                    AdamWConfig::new()
                        .with_weight_decay(ADAMW_WEIGHT_DECAY)
                        .init(),
                )
            }
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = SteelSegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "over9000" => Ok(OptimizerKind::Over9000),
            "adam" => Ok(OptimizerKind::Adam),
            "radam" => Ok(OptimizerKind::RAdam),
            "ralamb" => Ok(OptimizerKind::Ralamb),
            "ranger" => Ok(OptimizerKind::Ranger),
            "lookahead_adam" | "lookaheadadam" => Ok(OptimizerKind::LookaheadAdam),
            other => Err(SteelSegError::Config(format!(
                "unknown optimizer '{other}' (expected over9000, adam, radam, \
                 ralamb, ranger or lookahead_adam)"
            ))),
        }
    }
}

/// Optimizer instance for the segmentation model
pub enum SegOptimizer<B: AutodiffBackend> {
    Adam(OptimizerAdaptor<Adam<B::InnerBackend>, UNet<B>, B>),
    AdamW(OptimizerAdaptor<AdamW<B::InnerBackend>, UNet<B>, B>),
}

impl<B: AutodiffBackend> SegOptimizer<B> {
    /// Apply one optimizer step and return the updated model.
    pub fn step(&mut self, lr: f64, model: UNet<B>, grads: GradientsParams) -> UNet<B> {
        match self {
            SegOptimizer::Adam(inner) => inner.step(lr, model, grads),
            SegOptimizer::AdamW(inner) => inner.step(lr, model, grads),
        }
    }

    /// Persist the optimizer state (moment estimates) to a file.
    pub fn save_record_file(&self, recorder: &CompactRecorder, path: &Path) -> Result<()> {
        let result = match self {
            SegOptimizer::Adam(inner) => recorder.record(inner.to_record(), path.to_path_buf()),
            SegOptimizer::AdamW(inner) => recorder.record(inner.to_record(), path.to_path_buf()),
        };
        result.map_err(|e| SteelSegError::checkpoint(path, e.to_string()))
    }

    /// Restore optimizer state from a file, keeping the variant intact.
    pub fn load_record_file(
        self,
        recorder: &CompactRecorder,
        path: &Path,
        device: &B::Device,
    ) -> Result<Self> {
        match self {
            SegOptimizer::Adam(inner) => {
                let record = recorder
                    .load(path.to_path_buf(), device)
                    .map_err(|e| SteelSegError::checkpoint(path, e.to_string()))?;
                Ok(SegOptimizer::Adam(inner.load_record(record)))
            }
            SegOptimizer::AdamW(inner) => {
                let record = recorder
                    .load(path.to_path_buf(), device)
                    .map_err(|e| SteelSegError::checkpoint(path, e.to_string()))?;
                Ok(SegOptimizer::AdamW(inner.load_record(record)))
            }
        }
    }
}
