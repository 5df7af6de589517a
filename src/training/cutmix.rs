//! Cutmix augmentation
//!
//! Swaps a rectangular region between each sample and a randomly paired
//! partner in the same batch, applying the identical swap to image and mask
//! so the supervision stays aligned with the pixels.

use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::dataset::SegBatch;
use crate::error::{Result, SteelSegError};

/// Beta concentration used for sampling the mixing ratio
pub const CUTMIX_ALPHA: f64 = 0.5;

/// Rectangle to swap, in pixel coordinates (half-open ranges)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixRegion {
    pub y0: usize,
    pub y1: usize,
    pub x0: usize,
    pub x1: usize,
}

impl MixRegion {
    pub fn is_empty(&self) -> bool {
        self.y0 >= self.y1 || self.x0 >= self.x1
    }
}

/// Compute the swap rectangle for mixing ratio `lam`, centered at
/// `(cy, cx)` and clamped to the batch geometry. The rectangle covers
/// roughly a `1 - lam` fraction of the area.
pub fn mix_region(height: usize, width: usize, cy: usize, cx: usize, lam: f64) -> MixRegion {
    let cut_ratio = (1.0 - lam).max(0.0).sqrt();
    let cut_h = (height as f64 * cut_ratio).round() as usize;
    let cut_w = (width as f64 * cut_ratio).round() as usize;

    let y0 = cy.saturating_sub(cut_h / 2).min(height);
    let y1 = (cy + cut_h.div_ceil(2)).min(height);
    let x0 = cx.saturating_sub(cut_w / 2).min(width);
    let x1 = (cx + cut_w.div_ceil(2)).min(width);

    MixRegion { y0, y1, x0, x1 }
}

/// Swap `region` between each sample and its partner given by `indices`.
/// `indices[i]` names the sample whose region lands in sample `i`.
pub fn region_swap<B: Backend>(
    batch: &SegBatch<B>,
    indices: &[usize],
    region: MixRegion,
) -> SegBatch<B> {
    if region.is_empty() {
        return batch.clone();
    }

    let [n, c, h, w] = batch.images.dims();
    let [_, k, _, _] = batch.masks.dims();
    let device = batch.images.device();

    let index_data: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    let index = Tensor::<B, 1, Int>::from_ints(TensorData::new(index_data, [n]), &device);

    let ranges = |channels: usize| {
        [
            0..n,
            0..channels,
            region.y0..region.y1,
            region.x0..region.x1,
        ]
    };

    let image_patch = batch.images.clone().select(0, index.clone()).slice(ranges(c));
    let mask_patch = batch.masks.clone().select(0, index).slice(ranges(k));

    SegBatch {
        images: batch.images.clone().slice_assign(ranges(c), image_patch),
        masks: batch.masks.clone().slice_assign(ranges(k), mask_patch),
    }
}

/// Apply cutmix to a batch: draw a mixing ratio from Beta(alpha, alpha),
/// pick a random center and partner permutation, and swap the region.
pub fn cutmix<B: Backend, R: Rng>(
    batch: &SegBatch<B>,
    alpha: f64,
    rng: &mut R,
) -> Result<SegBatch<B>> {
    let [n, _, h, w] = batch.images.dims();
    if n < 2 {
        return Ok(batch.clone());
    }

    let beta = Beta::new(alpha, alpha)
        .map_err(|e| SteelSegError::Config(format!("invalid cutmix alpha {alpha}: {e}")))?;
    let lam: f64 = beta.sample(rng);

    let cy = rng.gen_range(0..h);
    let cx = rng.gen_range(0..w);
    let region = mix_region(h, w, cy, cx, lam);

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    Ok(region_swap(batch, &indices, region))
}
