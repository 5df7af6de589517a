//! Checkpoint persistence
//!
//! A checkpoint is three files sharing the run-name stem:
//!
//! - `<run>_model.mpk`: model weights (compact named-mpk record)
//! - `<run>_optim.mpk`: optimizer moment estimates
//! - `<run>.json`: metadata (epoch, best validation Dice, timestamp)
//!
//! Saving overwrites in place; the best checkpoint of a run is whatever was
//! written last.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SteelSegError};
use crate::model::UNet;

use super::optim::SegOptimizer;

/// Metadata stored alongside the weight files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Epoch the checkpoint was taken at (1-based)
    pub epoch: usize,
    /// Best validation Dice observed so far
    pub best_dice: f64,
    /// RFC 3339 timestamp of the save
    pub saved_at: String,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, best_dice: f64) -> Self {
        Self {
            epoch,
            best_dice,
            saved_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn model_stem(dir: &Path, run_name: &str) -> PathBuf {
    dir.join(format!("{run_name}_model"))
}

fn optim_stem(dir: &Path, run_name: &str) -> PathBuf {
    dir.join(format!("{run_name}_optim"))
}

fn meta_path(dir: &Path, run_name: &str) -> PathBuf {
    dir.join(format!("{run_name}.json"))
}

/// Write model, optimizer and metadata under `dir`.
pub fn save<B: AutodiffBackend>(
    dir: &Path,
    run_name: &str,
    model: &UNet<B>,
    optimizer: &SegOptimizer<B>,
    meta: &CheckpointMeta,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    let recorder = CompactRecorder::new();

    let model_path = model_stem(dir, run_name);
    model
        .clone()
        .save_file(&model_path, &recorder)
        .map_err(|e| SteelSegError::checkpoint(&model_path, e.to_string()))?;

    optimizer.save_record_file(&recorder, &optim_stem(dir, run_name))?;

    fs::write(meta_path(dir, run_name), serde_json::to_string_pretty(meta)?)?;

    info!(
        "Saved checkpoint '{}' (epoch {}, dice {:.4})",
        run_name, meta.epoch, meta.best_dice
    );
    Ok(())
}

/// Load a checkpoint saved by [`save`], consuming fresh model and optimizer
/// instances and returning them with the stored state applied.
pub fn load<B: AutodiffBackend>(
    dir: &Path,
    run_name: &str,
    model: UNet<B>,
    optimizer: SegOptimizer<B>,
    device: &B::Device,
) -> Result<(UNet<B>, SegOptimizer<B>, CheckpointMeta)> {
    let recorder = CompactRecorder::new();

    let model_path = model_stem(dir, run_name);
    let model = model
        .load_file(&model_path, &recorder, device)
        .map_err(|e| SteelSegError::checkpoint(&model_path, e.to_string()))?;

    let optimizer = optimizer.load_record_file(&recorder, &optim_stem(dir, run_name), device)?;

    let meta_file = meta_path(dir, run_name);
    let meta_text = fs::read_to_string(&meta_file)
        .map_err(|e| SteelSegError::checkpoint(&meta_file, e.to_string()))?;
    let meta: CheckpointMeta = serde_json::from_str(&meta_text)?;

    Ok((model, optimizer, meta))
}
