//! Loss strategies for multi-channel segmentation
//!
//! Three criteria are supported, selected by name at configuration time:
//!
//! - `BCE`: per-pixel binary cross entropy on logits
//! - `BCE+DICE`: binary cross entropy plus a soft Dice term
//! - `TVERSKY`: Tversky loss weighting false negatives over false positives
//!
//! Each criterion carries a channel-layout contract: BCE-family losses
//! consume channels-last tensors, Tversky consumes channels-first. The
//! trainer applies the layout once for both logits and targets so a
//! criterion never sees the wrong arrangement.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

use crate::error::SteelSegError;

/// Smoothing constant for Dice and Tversky denominators
const SMOOTH: f32 = 1.0;

/// Tversky false-positive weight
const TVERSKY_ALPHA: f32 = 0.3;

/// Tversky false-negative weight
const TVERSKY_BETA: f32 = 0.7;

/// Loss selector, parsed from its configuration name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    Bce,
    BceDice,
    Tversky,
}

impl LossKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LossKind::Bce => "BCE",
            LossKind::BceDice => "BCE+DICE",
            LossKind::Tversky => "TVERSKY",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LossKind {
    type Err = SteelSegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BCE" => Ok(LossKind::Bce),
            "BCE+DICE" | "BCE_DICE" | "BCEDICE" => Ok(LossKind::BceDice),
            "TVERSKY" => Ok(LossKind::Tversky),
            other => Err(SteelSegError::Config(format!(
                "unknown loss '{other}' (expected BCE, BCE+DICE or TVERSKY)"
            ))),
        }
    }
}

/// Tensor arrangement a criterion expects its inputs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// [batch, channels, height, width], as produced by the model
    ChannelsFirst,
    /// [batch, height, width, channels]
    ChannelsLast,
}

impl ChannelLayout {
    /// Rearrange a channels-first tensor into this layout.
    pub fn apply<B: Backend>(self, tensor: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            ChannelLayout::ChannelsFirst => tensor,
            ChannelLayout::ChannelsLast => tensor.permute([0, 2, 3, 1]),
        }
    }
}

/// A configured loss criterion
#[derive(Debug, Clone, Copy)]
pub enum Criterion {
    Bce,
    BceDice,
    Tversky,
}

impl From<LossKind> for Criterion {
    fn from(kind: LossKind) -> Self {
        match kind {
            LossKind::Bce => Criterion::Bce,
            LossKind::BceDice => Criterion::BceDice,
            LossKind::Tversky => Criterion::Tversky,
        }
    }
}

impl Criterion {
    /// Layout this criterion expects logits and targets in.
    pub fn layout(&self) -> ChannelLayout {
        match self {
            Criterion::Bce | Criterion::BceDice => ChannelLayout::ChannelsLast,
            Criterion::Tversky => ChannelLayout::ChannelsFirst,
        }
    }

    /// Rearrange a channels-first logits/targets pair into this criterion's
    /// layout. Both tensors get the identical permutation, so predictions
    /// and supervision stay aligned.
    pub fn layout_pair<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let layout = self.layout();
        (layout.apply(logits), layout.apply(targets))
    }

    /// Compute the scalar loss. `logits` and `targets` must already be in
    /// `self.layout()`.
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        match self {
            Criterion::Bce => bce_with_logits(logits, targets),
            Criterion::BceDice => {
                let bce = bce_with_logits(logits.clone(), targets.clone());
                bce + dice_loss(logits, targets)
            }
            Criterion::Tversky => tversky_loss(logits, targets),
        }
    }
}

/// Numerically stable binary cross entropy on logits:
/// `-(y * log_sigmoid(x) + (1 - y) * log_sigmoid(-x))`, averaged.
fn bce_with_logits<B: Backend>(logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
    let pos = targets.clone() * activation::log_sigmoid(logits.clone());
    let neg = (targets.neg() + 1.0) * activation::log_sigmoid(logits.neg());
    (pos + neg).neg().mean()
}

/// Soft Dice loss: `1 - (2 * intersection + smooth) / (sums + smooth)`.
fn dice_loss<B: Backend>(logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
    let probs = activation::sigmoid(logits);
    let intersection = (probs.clone() * targets.clone()).sum();
    let sums = probs.sum() + targets.sum();
    let dice = (intersection * 2.0 + SMOOTH) / (sums + SMOOTH);
    dice.neg() + 1.0
}

/// Tversky loss with fixed alpha/beta, penalizing false negatives harder
/// than false positives.
fn tversky_loss<B: Backend>(logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
    let probs = activation::sigmoid(logits);
    let tp = (probs.clone() * targets.clone()).sum();
    let fp = (probs.clone() * (targets.clone().neg() + 1.0)).sum();
    let fn_ = ((probs.neg() + 1.0) * targets).sum();
    let index = (tp.clone() + SMOOTH) / (tp + fp * TVERSKY_ALPHA + fn_ * TVERSKY_BETA + SMOOTH);
    index.neg() + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn tensor_from(data: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::from_floats(TensorData::new(data, shape), &device)
    }

    #[test]
    fn test_unknown_loss_name_is_rejected() {
        let err = "FOCAL".parse::<LossKind>();
        assert!(matches!(err, Err(SteelSegError::Config(_))));
    }

    #[test]
    fn test_known_loss_names_parse_case_insensitively() {
        assert_eq!("bce".parse::<LossKind>().unwrap(), LossKind::Bce);
        assert_eq!("BCE+DICE".parse::<LossKind>().unwrap(), LossKind::BceDice);
        assert_eq!("tversky".parse::<LossKind>().unwrap(), LossKind::Tversky);
    }

    #[test]
    fn test_channels_last_permutes_dims() {
        let t = tensor_from(vec![0.0; 2 * 3 * 4 * 5], [2, 3, 4, 5]);
        assert_eq!(ChannelLayout::ChannelsLast.apply(t.clone()).dims(), [2, 4, 5, 3]);
        assert_eq!(ChannelLayout::ChannelsFirst.apply(t).dims(), [2, 3, 4, 5]);
    }

    #[test]
    fn test_criterion_layouts() {
        assert_eq!(Criterion::Bce.layout(), ChannelLayout::ChannelsLast);
        assert_eq!(Criterion::BceDice.layout(), ChannelLayout::ChannelsLast);
        assert_eq!(Criterion::Tversky.layout(), ChannelLayout::ChannelsFirst);
    }

    #[test]
    fn test_bce_at_zero_logits_is_ln_two() {
        let logits = tensor_from(vec![0.0; 16], [1, 2, 2, 4]);
        let targets = tensor_from(vec![1.0; 16], [1, 2, 2, 4]);
        let loss: f32 = Criterion::Bce.forward(logits, targets).into_scalar().elem();
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_confident_correct_prediction_has_low_loss() {
        let logits = tensor_from(vec![10.0; 16], [1, 2, 2, 4]);
        let targets = tensor_from(vec![1.0; 16], [1, 2, 2, 4]);

        let bce: f32 = Criterion::Bce
            .forward(logits.clone(), targets.clone())
            .into_scalar()
            .elem();
        assert!(bce < 1e-3);

        let bce_dice: f32 = Criterion::BceDice
            .forward(logits.clone(), targets.clone())
            .into_scalar()
            .elem();
        assert!(bce_dice < 1e-2);

        let tversky: f32 = Criterion::Tversky
            .forward(logits, targets)
            .into_scalar()
            .elem();
        assert!(tversky < 1e-2);
    }

    #[test]
    fn test_confident_wrong_prediction_has_high_loss() {
        let logits = tensor_from(vec![10.0; 16], [1, 2, 2, 4]);
        let targets = tensor_from(vec![0.0; 16], [1, 2, 2, 4]);
        let loss: f32 = Criterion::BceDice.forward(logits, targets).into_scalar().elem();
        assert!(loss > 1.0);
    }
}
