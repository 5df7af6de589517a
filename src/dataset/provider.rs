//! Batch providers
//!
//! The trainer consumes data through the `BatchProvider` trait: one provider
//! per phase, each yielding the full batch sequence for an epoch. The batch
//! count is the length of the returned vector, which the trainer uses for
//! progress reporting and epoch-loss normalization. A sample that fails to
//! load fails the epoch; batches never shrink silently.

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::backend::Backend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::Result;

use super::{SegBatch, SegBatcher, SegDataset};

/// Source of batches for one phase of training
pub trait BatchProvider<B: Backend> {
    /// Produce the ordered batch sequence for the given epoch.
    fn batches(&mut self, epoch: usize) -> Result<Vec<SegBatch<B>>>;
}

/// Disk-backed provider: draws items from a `SegDataset`, shuffling the
/// sample order each epoch when `shuffle` is set (train phase).
pub struct DiskBatchProvider<B: Backend> {
    dataset: SegDataset,
    batcher: SegBatcher<B>,
    batch_size: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl<B: Backend> DiskBatchProvider<B> {
    pub fn new(
        dataset: SegDataset,
        batcher: SegBatcher<B>,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Self {
        Self {
            dataset,
            batcher,
            batch_size,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl<B: Backend> BatchProvider<B> for DiskBatchProvider<B> {
    fn batches(&mut self, _epoch: usize) -> Result<Vec<SegBatch<B>>> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }

        let mut batches = Vec::with_capacity(indices.len().div_ceil(self.batch_size.max(1)));
        for chunk in indices.chunks(self.batch_size) {
            let items = chunk
                .iter()
                .map(|&i| self.dataset.load(i))
                .collect::<Result<Vec<_>>>()?;
            batches.push(self.batcher.batch(items));
        }
        Ok(batches)
    }
}

/// Provider over pre-built batches, used in tests and for small cached runs
pub struct InMemoryProvider<B: Backend> {
    batches: Vec<SegBatch<B>>,
}

impl<B: Backend> InMemoryProvider<B> {
    pub fn new(batches: Vec<SegBatch<B>>) -> Self {
        Self { batches }
    }
}

impl<B: Backend> BatchProvider<B> for InMemoryProvider<B> {
    fn batches(&mut self, _epoch: usize) -> Result<Vec<SegBatch<B>>> {
        Ok(self.batches.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SegItem;
    use crate::error::SteelSegError;
    use crate::training::Phase;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn constant_batch(value: f32) -> SegBatch<TestBackend> {
        let device = Default::default();
        let batcher = SegBatcher::<TestBackend>::new(device, 4, 4, 1);
        let item = SegItem::from_data(
            vec![value; 3 * 16],
            vec![0.0; 16],
            4,
            4,
            1,
            "mem".to_string(),
        );
        batcher.batch(vec![item.clone(), item])
    }

    #[test]
    fn test_in_memory_provider_is_stable() {
        let mut provider = InMemoryProvider::new(vec![constant_batch(0.1), constant_batch(0.9)]);
        assert_eq!(provider.batches(0).unwrap().len(), 2);
        assert_eq!(provider.batches(1).unwrap().len(), 2);
    }

    #[test]
    fn test_disk_provider_batches_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("train").join("images");
        let mask_dir = dir.path().join("train").join("masks");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();

        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([90, 90, 90]));
        let mask = image::GrayImage::from_pixel(8, 8, image::Luma([1]));
        for name in ["a.png", "b.png", "c.png"] {
            img.save(image_dir.join(name)).unwrap();
            mask.save(mask_dir.join(name)).unwrap();
        }

        let dataset = SegDataset::from_dir(dir.path(), Phase::Train, 8, 8, 4).unwrap();
        let batcher = SegBatcher::<TestBackend>::new(Default::default(), 8, 8, 4);
        let mut provider = DiskBatchProvider::new(dataset, batcher, 2, false, 1);

        let batches = provider.batches(0).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].images.dims()[0], 2);
        assert_eq!(batches[1].images.dims()[0], 1);
    }

    #[test]
    fn test_unreadable_sample_fails_the_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("train").join("images");
        let mask_dir = dir.path().join("train").join("masks");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();

        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([90, 90, 90]));
        let mask = image::GrayImage::from_pixel(8, 8, image::Luma([1]));
        img.save(image_dir.join("a.png")).unwrap();
        mask.save(mask_dir.join("a.png")).unwrap();

        // Garbage image with a perfectly valid mask: the scan accepts it,
        // loading must not.
        std::fs::write(image_dir.join("b.png"), b"not an image").unwrap();
        mask.save(mask_dir.join("b.png")).unwrap();

        let dataset = SegDataset::from_dir(dir.path(), Phase::Train, 8, 8, 4).unwrap();
        let batcher = SegBatcher::<TestBackend>::new(Default::default(), 8, 8, 4);
        let mut provider = DiskBatchProvider::new(dataset, batcher, 2, false, 1);

        let err = provider.batches(0);
        assert!(matches!(err, Err(SteelSegError::ImageLoad(_, _))));
    }
}
