//! Image-folder dataset and batch loading.
//!
//! Layout: `<split_root>/**/{0_real,1_fake}/<image>`. The label comes from
//! the class directory the image sits in.

use std::path::{Path, PathBuf};

use aigv_detector::{preprocess::open_rgb, Augmentation, ImageTensor, Preprocessor};
use aigv_models::{is_image_file, TrainConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::info;

use crate::error::{TrainError, TrainResult};

/// Class directory holding real samples.
pub const REAL_DIR: &str = "0_real";
/// Class directory holding fake samples.
pub const FAKE_DIR: &str = "1_fake";

/// One labelled image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    /// `true` for fake.
    pub label: bool,
}

/// Preprocessed images with labels, in sample order.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub images: Vec<ImageTensor>,
    pub labels: Vec<bool>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// All labelled images under a split directory.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    root: PathBuf,
    samples: Vec<Sample>,
}

impl ImageFolderDataset {
    /// Scan `root` recursively. An empty dataset is a configuration error.
    pub fn open(root: impl Into<PathBuf>) -> TrainResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TrainError::config(format!(
                "Dataset directory not found: {}",
                root.display()
            )));
        }

        let mut samples = Vec::new();
        collect_samples(&root, None, &mut samples)?;
        samples.sort_by(|a, b| a.path.cmp(&b.path));

        if samples.is_empty() {
            return Err(TrainError::config(format!(
                "No images under {}/**/{{{},{}}}",
                root.display(),
                REAL_DIR,
                FAKE_DIR
            )));
        }

        let fakes = samples.iter().filter(|s| s.label).count();
        info!(
            root = %root.display(),
            samples = samples.len(),
            fake = fakes,
            real = samples.len() - fakes,
            "Dataset loaded"
        );

        Ok(Self { root, samples })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn class_label(dir_name: &str) -> Option<bool> {
    match dir_name {
        REAL_DIR => Some(false),
        FAKE_DIR => Some(true),
        _ => None,
    }
}

fn collect_samples(dir: &Path, label: Option<bool>, out: &mut Vec<Sample>) -> TrainResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            collect_samples(&path, class_label(name).or(label), out)?;
        } else if let Some(label) = label {
            if is_image_file(&path) {
                out.push(Sample { path, label });
            }
        }
    }
    Ok(())
}

/// Source of training or validation batches.
pub trait BatchSource: Send + Sync {
    /// Batches per epoch.
    fn num_batches(&self) -> usize;

    /// Samples per epoch.
    fn num_samples(&self) -> usize;

    /// Batch `index` of `epoch`. Same arguments give the same batch.
    fn batch(&self, epoch: usize, index: usize) -> TrainResult<Batch>;
}

/// Loader settings derived from a [`TrainConfig`].
#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub augmentation: Augmentation,
    pub preprocessor: Preprocessor,
    pub seed: u64,
}

impl LoaderOptions {
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            shuffle: config.shuffle,
            augmentation: Augmentation {
                random_crop: config.aug_crop,
                horizontal_flip: config.aug_flip,
            },
            preprocessor: Preprocessor::new(config.crop_size, config.aug_norm),
            seed: config.seed,
        }
    }
}

/// Seeded shuffling batch loader that decodes images in parallel.
pub struct BatchLoader {
    dataset: ImageFolderDataset,
    options: LoaderOptions,
}

impl BatchLoader {
    pub fn new(dataset: ImageFolderDataset, options: LoaderOptions) -> Self {
        Self { dataset, options }
    }

    /// Loader over `config.split_root()`.
    pub fn from_config(config: &TrainConfig) -> TrainResult<Self> {
        let dataset = ImageFolderDataset::open(config.split_root())?;
        Ok(Self::new(dataset, LoaderOptions::from_config(config)))
    }

    pub fn dataset(&self) -> &ImageFolderDataset {
        &self.dataset
    }

    /// Sample order for `epoch`.
    fn order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.options.shuffle {
            let mut rng = StdRng::seed_from_u64(self.options.seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            order.shuffle(&mut rng);
        }
        order
    }

    fn load_sample(&self, sample: &Sample, epoch: usize, position: usize) -> TrainResult<ImageTensor> {
        let image = open_rgb(&sample.path).map_err(|e| TrainError::data(e.to_string()))?;
        let augmentation = self.options.augmentation;
        if augmentation == Augmentation::default() {
            return Ok(self.options.preprocessor.prepare(&image));
        }

        // Per-sample stream so parallel decoding stays reproducible
        let seed = self
            .options
            .seed
            .wrapping_add((epoch as u64) << 32)
            .wrapping_add(position as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(self
            .options
            .preprocessor
            .prepare_augmented(&image, augmentation, &mut rng))
    }
}

impl BatchSource for BatchLoader {
    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.options.batch_size)
    }

    fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    fn batch(&self, epoch: usize, index: usize) -> TrainResult<Batch> {
        let order = self.order(epoch);
        let start = index * self.options.batch_size;
        if start >= order.len() {
            return Err(TrainError::data(format!(
                "Batch {} out of range ({} batches)",
                index,
                self.num_batches()
            )));
        }
        let end = (start + self.options.batch_size).min(order.len());
        let positions = &order[start..end];

        let images = positions
            .par_iter()
            .map(|&i| self.load_sample(&self.dataset.samples[i], epoch, i))
            .collect::<TrainResult<Vec<_>>>()?;
        let labels = positions.iter().map(|&i| self.dataset.samples[i].label).collect();

        Ok(Batch { images, labels })
    }
}
