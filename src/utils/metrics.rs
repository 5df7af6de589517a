//! Segmentation metrics
//!
//! Accumulates thresholded Dice, IoU and F2 over the batches of one epoch.
//! Metrics are computed on sigmoid probabilities binarized at 0.5, matching
//! how predicted masks would be exported.

use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

/// Threshold applied to sigmoid probabilities before counting
const THRESHOLD: f32 = 0.5;

/// Smoothing added to numerator and denominator
const EPS: f64 = 1e-7;

/// Averaged metric values for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochScores {
    pub dice: f64,
    pub iou: f64,
    pub f2: f64,
}

/// Running metric accumulator for one phase of one epoch
#[derive(Debug, Clone, Default)]
pub struct SegmentationMeter {
    dice_sum: f64,
    iou_sum: f64,
    f2_sum: f64,
    batches: usize,
}

impl SegmentationMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch into the running averages. `outputs` are raw logits
    /// with the same shape as `targets`.
    pub fn update<B: Backend>(&mut self, targets: &Tensor<B, 4>, outputs: &Tensor<B, 4>) {
        let preds = activation::sigmoid(outputs.clone())
            .greater_elem(THRESHOLD)
            .float();

        let tp: f64 = (preds.clone() * targets.clone()).sum().into_scalar().elem();
        let pred_sum: f64 = preds.sum().into_scalar().elem();
        let target_sum: f64 = targets.clone().sum().into_scalar().elem();

        let fp = pred_sum - tp;
        let fn_ = target_sum - tp;

        self.dice_sum += (2.0 * tp + EPS) / (pred_sum + target_sum + EPS);
        self.iou_sum += (tp + EPS) / (pred_sum + target_sum - tp + EPS);
        self.f2_sum += (5.0 * tp + EPS) / (5.0 * tp + 4.0 * fn_ + fp + EPS);
        self.batches += 1;
    }

    /// Average scores over the batches seen so far.
    pub fn epoch_summary(&self) -> EpochScores {
        let n = self.batches.max(1) as f64;
        EpochScores {
            dice: self.dice_sum / n,
            iou: self.iou_sum / n,
            f2: self.f2_sum / n,
        }
    }
}
