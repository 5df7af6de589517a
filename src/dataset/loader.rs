//! Disk loader for steel defect (image, mask) pairs
//!
//! Expects the directory layout
//!
//! ```text
//! <root>/<phase>/images/<stem>.{png,jpg,jpeg}
//! <root>/<phase>/masks/<stem>.png
//! ```
//!
//! where `<phase>` is `train` or `val`. Every image must have a mask with the
//! same stem; a missing mask is a dataset error, not a silent skip.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, SteelSegError};
use crate::training::Phase;

use super::SegItem;

/// A single sample location on disk
#[derive(Clone, Debug)]
pub struct SegSample {
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
}

/// Dataset of (image, mask) pairs
///
/// The scan records paths only; images are loaded lazily through
/// [`SegDataset::load`], which fails loudly on unreadable files.
#[derive(Clone, Debug)]
pub struct SegDataset {
    samples: Vec<SegSample>,
    height: usize,
    width: usize,
    num_classes: usize,
}

impl SegDataset {
    /// Scan `<root>/<phase>` for image/mask pairs.
    pub fn from_dir(
        root: &Path,
        phase: Phase,
        height: usize,
        width: usize,
        num_classes: usize,
    ) -> Result<Self> {
        let image_dir = root.join(phase.as_str()).join("images");
        let mask_dir = root.join(phase.as_str()).join("masks");

        if !image_dir.is_dir() {
            return Err(SteelSegError::Dataset(format!(
                "image directory not found: {}",
                image_dir.display()
            )));
        }

        let mut samples = Vec::new();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&image_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("png") | Some("jpg") | Some("jpeg")
                )
            })
            .collect();
        entries.sort();

        for image_path in entries {
            let stem = image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    SteelSegError::Dataset(format!("invalid file name: {}", image_path.display()))
                })?;
            let mask_path = mask_dir.join(format!("{stem}.png"));
            if !mask_path.is_file() {
                return Err(SteelSegError::Dataset(format!(
                    "missing mask for '{}': expected {}",
                    image_path.display(),
                    mask_path.display()
                )));
            }
            samples.push(SegSample {
                image_path,
                mask_path,
            });
        }

        if samples.is_empty() {
            return Err(SteelSegError::Dataset(format!(
                "no samples found under {}",
                image_dir.display()
            )));
        }

        info!(
            "Loaded {} {} samples from {}",
            samples.len(),
            phase.as_str(),
            root.display()
        );

        Ok(Self {
            samples,
            height,
            width,
            num_classes,
        })
    }

    /// Build a dataset from explicit sample locations
    pub fn from_samples(
        samples: Vec<SegSample>,
        height: usize,
        width: usize,
        num_classes: usize,
    ) -> Self {
        Self {
            samples,
            height,
            width,
            num_classes,
        }
    }

    /// Number of mask channels
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Load the sample at `index` from disk. An unreadable or corrupt file
    /// is an error; a run must not quietly continue on a shrunken batch.
    pub fn load(&self, index: usize) -> Result<SegItem> {
        let sample = self.samples.get(index).ok_or_else(|| {
            SteelSegError::Dataset(format!(
                "sample index {} out of range (dataset has {})",
                index,
                self.samples.len()
            ))
        })?;
        SegItem::from_paths(
            &sample.image_path,
            &sample.mask_path,
            self.height,
            self.width,
            self.num_classes,
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_an_error() {
        let err = SegDataset::from_dir(Path::new("/nonexistent"), Phase::Train, 8, 8, 4);
        assert!(matches!(err, Err(SteelSegError::Dataset(_))));
    }

    #[test]
    fn test_missing_mask_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("train").join("images");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(dir.path().join("train").join("masks")).unwrap();

        // A 2x2 gray PNG with no matching mask.
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([128, 128, 128]));
        img.save(image_dir.join("crop_0.png")).unwrap();

        let err = SegDataset::from_dir(dir.path(), Phase::Train, 8, 8, 4);
        assert!(matches!(err, Err(SteelSegError::Dataset(_))));
    }

    #[test]
    fn test_pair_loading_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("val").join("images");
        let mask_dir = dir.path().join("val").join("masks");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();

        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([64, 64, 64]));
        img.save(image_dir.join("crop_0.png")).unwrap();
        // Mask entirely class 2.
        let mask = image::GrayImage::from_pixel(8, 8, image::Luma([2]));
        mask.save(mask_dir.join("crop_0.png")).unwrap();

        let dataset = SegDataset::from_dir(dir.path(), Phase::Val, 8, 8, 4).unwrap();
        assert_eq!(dataset.len(), 1);

        let item = dataset.load(0).unwrap();
        // Channel 1 (class 2) is all ones, the rest all zeros.
        let hw = 8 * 8;
        assert!(item.mask[hw..2 * hw].iter().all(|&v| v == 1.0));
        assert!(item.mask[..hw].iter().all(|&v| v == 0.0));
        assert!(item.mask[2 * hw..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_corrupt_image_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("train").join("images");
        let mask_dir = dir.path().join("train").join("masks");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();

        // The scan only checks existence, so a garbage file passes it.
        std::fs::write(image_dir.join("crop_0.png"), b"not an image").unwrap();
        let mask = image::GrayImage::from_pixel(8, 8, image::Luma([1]));
        mask.save(mask_dir.join("crop_0.png")).unwrap();

        let dataset = SegDataset::from_dir(dir.path(), Phase::Train, 8, 8, 4).unwrap();
        let err = dataset.load(0);
        assert!(matches!(err, Err(SteelSegError::ImageLoad(_, _))));
    }
}
