//! Dataset module for steel surface defect data handling
//!
//! This module provides functionality for:
//! - Loading (image, mask) pairs from disk and converting them to tensors
//! - Batching items with ImageNet normalization
//! - The `BatchProvider` seam the trainer consumes batches through
//!
//! Masks are stored as grayscale PNGs where pixel value `v` encodes defect
//! class `v` (0 = no defect, 1..=num_classes = defect class). Batches expand
//! them to one float channel per class so the loss can consume them directly.

pub mod loader;
pub mod provider;

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::imageops::FilterType;
use image::ImageReader;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SteelSegError};

pub use loader::{SegDataset, SegSample};
pub use provider::{BatchProvider, DiskBatchProvider, InMemoryProvider};

/// A single (image, mask) sample ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegItem {
    /// Image data as flattened CHW float array [3 * H * W], range [0, 1]
    pub image: Vec<f32>,
    /// Mask data as flattened KHW float array [num_classes * H * W], {0, 1}
    pub mask: Vec<f32>,
    /// Image height
    pub height: usize,
    /// Image width
    pub width: usize,
    /// Number of mask channels
    pub num_classes: usize,
    /// Source path (for debugging/logging)
    pub path: String,
}

impl SegItem {
    /// Load an (image, mask) pair from disk, resizing both to `(height, width)`.
    pub fn from_paths(
        image_path: &Path,
        mask_path: &Path,
        height: usize,
        width: usize,
        num_classes: usize,
    ) -> Result<Self> {
        let img = ImageReader::open(image_path)?
            .decode()
            .map_err(|e| SteelSegError::ImageLoad(image_path.to_path_buf(), e.to_string()))?
            .resize_exact(width as u32, height as u32, FilterType::Triangle)
            .to_rgb8();

        let mut image = vec![0.0f32; 3 * height * width];
        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x as u32, y as u32);
                image[y * width + x] = pixel[0] as f32 / 255.0;
                image[height * width + y * width + x] = pixel[1] as f32 / 255.0;
                image[2 * height * width + y * width + x] = pixel[2] as f32 / 255.0;
            }
        }

        // Masks use nearest-neighbour resizing so class indices stay exact.
        let mask_img = ImageReader::open(mask_path)?
            .decode()
            .map_err(|e| SteelSegError::ImageLoad(mask_path.to_path_buf(), e.to_string()))?
            .resize_exact(width as u32, height as u32, FilterType::Nearest)
            .to_luma8();

        let mut mask = vec![0.0f32; num_classes * height * width];
        for y in 0..height {
            for x in 0..width {
                let v = mask_img.get_pixel(x as u32, y as u32)[0] as usize;
                if v >= 1 && v <= num_classes {
                    mask[(v - 1) * height * width + y * width + x] = 1.0;
                }
            }
        }

        Ok(Self {
            image,
            mask,
            height,
            width,
            num_classes,
            path: image_path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-loaded data
    pub fn from_data(
        image: Vec<f32>,
        mask: Vec<f32>,
        height: usize,
        width: usize,
        num_classes: usize,
        path: String,
    ) -> Self {
        Self {
            image,
            mask,
            height,
            width,
            num_classes,
            path,
        }
    }
}

/// A batch of segmentation samples
#[derive(Clone, Debug)]
pub struct SegBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of target masks with shape [batch_size, num_classes, height, width]
    pub masks: Tensor<B, 4>,
}

/// Batcher for creating segmentation training batches
#[derive(Clone, Debug)]
pub struct SegBatcher<B: Backend> {
    device: B::Device,
    height: usize,
    width: usize,
    num_classes: usize,
}

impl<B: Backend> SegBatcher<B> {
    /// Create a new batcher for the given device and sample geometry
    pub fn new(device: B::Device, height: usize, width: usize, num_classes: usize) -> Self {
        Self {
            device,
            height,
            width,
            num_classes,
        }
    }
}

impl<B: Backend> Batcher<SegItem, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegItem>) -> SegBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.height, self.width);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            &self.device,
        );

        // ImageNet normalization: (x - mean) / std
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.485f32, 0.456, 0.406], [1, 3, 1, 1]),
            &self.device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.229f32, 0.224, 0.225], [1, 3, 1, 1]),
            &self.device,
        );
        let images = (images - mean) / std;

        let masks_data: Vec<f32> = items.iter().flat_map(|item| item.mask.clone()).collect();
        let masks = Tensor::<B, 4>::from_floats(
            TensorData::new(masks_data, [batch_size, self.num_classes, height, width]),
            &self.device,
        );

        SegBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_seg_item_from_data() {
        let item = SegItem::from_data(
            vec![0.5; 3 * 8 * 8],
            vec![0.0; 2 * 8 * 8],
            8,
            8,
            2,
            "crop.png".to_string(),
        );
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert_eq!(item.mask.len(), 2 * 8 * 8);
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batcher = SegBatcher::<TestBackend>::new(device, 8, 16, 4);

        let items: Vec<SegItem> = (0..3)
            .map(|i| {
                SegItem::from_data(
                    vec![0.5; 3 * 8 * 16],
                    vec![0.0; 4 * 8 * 16],
                    8,
                    16,
                    4,
                    format!("crop_{i}.png"),
                )
            })
            .collect();

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [3, 3, 8, 16]);
        assert_eq!(batch.masks.dims(), [3, 4, 8, 16]);
    }
}
