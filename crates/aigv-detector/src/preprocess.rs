//! Image preprocessing shared by inference and training.
//!
//! Images are cropped to a fixed square (zero-padding any side that is too
//! short), converted from HWC `u8` to CHW `f32` in `[0, 1]`, and optionally
//! normalised with ImageNet channel statistics.

use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use rand::Rng;

use crate::error::{DetectError, DetectResult};

/// Classifier input side length.
pub const DEFAULT_CROP_SIZE: u32 = 448;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single `[3, H, W]` float image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl ImageTensor {
    /// Convert an RGB raster to CHW floats.
    pub fn from_rgb(image: &RgbImage, normalize: bool) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;
        let mut data = vec![0f32; 3 * plane];

        for (i, pixel) in image.pixels().enumerate() {
            for c in 0..3 {
                let mut value = pixel[c] as f32 / 255.0;
                if normalize {
                    value = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                }
                data[c * plane + i] = value;
            }
        }

        Self { data, width, height }
    }

    /// Wrap existing CHW data.
    pub fn from_chw(width: usize, height: usize, data: Vec<f32>) -> DetectResult<Self> {
        if data.len() != 3 * width * height {
            return Err(DetectError::config(format!(
                "CHW buffer has {} values, expected {} for {}x{}",
                data.len(),
                3 * width * height,
                width,
                height
            )));
        }
        Ok(Self { data, width, height })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// NCHW shape with a batch of one.
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height, self.width]
    }
}

/// Training-time augmentation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Augmentation {
    pub random_crop: bool,
    pub horizontal_flip: bool,
}

/// Crop + tensor conversion with fixed settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    pub crop_size: u32,
    pub normalize: bool,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            crop_size: DEFAULT_CROP_SIZE,
            normalize: true,
        }
    }
}

impl Preprocessor {
    pub fn new(crop_size: u32, normalize: bool) -> Self {
        Self {
            crop_size,
            normalize,
        }
    }

    /// Centre crop and convert.
    pub fn prepare(&self, image: &RgbImage) -> ImageTensor {
        ImageTensor::from_rgb(&center_crop(image, self.crop_size), self.normalize)
    }

    /// Crop and flip according to `augmentation`, then convert.
    pub fn prepare_augmented<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        augmentation: Augmentation,
        rng: &mut R,
    ) -> ImageTensor {
        let mut cropped = if augmentation.random_crop {
            random_crop(image, self.crop_size, rng)
        } else {
            center_crop(image, self.crop_size)
        };
        if augmentation.horizontal_flip && rng.random_bool(0.5) {
            imageops::flip_horizontal_in_place(&mut cropped);
        }
        ImageTensor::from_rgb(&cropped, self.normalize)
    }

    /// Decode an image file and prepare it.
    pub fn load(&self, path: &Path) -> DetectResult<ImageTensor> {
        Ok(self.prepare(&open_rgb(path)?))
    }
}

/// Decode any supported image file as RGB.
pub fn open_rgb(path: &Path) -> DetectResult<RgbImage> {
    Ok(image::open(path)
        .map_err(|e| DetectError::image(path, e))?
        .to_rgb8())
}

/// Square centre crop; axes shorter than `size` are zero-padded evenly.
///
/// Offsets round half to even so results match torchvision's `CenterCrop`.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let left = center_offset(image.width(), size);
    let top = center_offset(image.height(), size);
    crop_padded(image, left, top, size)
}

/// Square crop at a uniformly random position. Axes shorter than `size` are
/// centred and zero-padded.
pub fn random_crop<R: Rng + ?Sized>(image: &RgbImage, size: u32, rng: &mut R) -> RgbImage {
    let offset = |len: u32, rng: &mut R| {
        if len > size {
            rng.random_range(0..=len - size) as i64
        } else {
            center_offset(len, size)
        }
    };
    let left = offset(image.width(), rng);
    let top = offset(image.height(), rng);
    crop_padded(image, left, top, size)
}

fn center_offset(len: u32, size: u32) -> i64 {
    if len >= size {
        ((len - size) as f64 / 2.0).round_ties_even() as i64
    } else {
        -(((size - len) / 2) as i64)
    }
}

/// `size x size` window at `(left, top)`; pixels outside the source are black.
fn crop_padded(image: &RgbImage, left: i64, top: i64, size: u32) -> RgbImage {
    let (w, h) = (image.width() as i64, image.height() as i64);
    RgbImage::from_fn(size, size, |x, y| {
        let sx = x as i64 + left;
        let sy = y as i64 + top;
        if (0..w).contains(&sx) && (0..h).contains(&sy) {
            *image.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}
