//! Padding frames to the flow network's input multiple.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::field::FlowField;
use crate::error::MediaResult;

/// Input multiple required by RAFT-style estimators.
pub const DEFAULT_PAD_MULTIPLE: u32 = 8;

/// Where vertical padding goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadMode {
    /// Split evenly between top and bottom.
    #[default]
    Sintel,
    /// All at the bottom.
    Kitti,
}

/// Replicate-edge padder with an exact inverse for flow fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPadder {
    width: u32,
    height: u32,
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

impl InputPadder {
    /// Padder for `width x height` input rounded up to `multiple`.
    pub fn new(width: u32, height: u32, mode: PadMode, multiple: u32) -> Self {
        let multiple = multiple.max(1);
        let pad_w = (multiple - width % multiple) % multiple;
        let pad_h = (multiple - height % multiple) % multiple;

        let left = pad_w / 2;
        let (top, bottom) = match mode {
            PadMode::Sintel => (pad_h / 2, pad_h - pad_h / 2),
            PadMode::Kitti => (0, pad_h),
        };

        Self {
            width,
            height,
            left,
            right: pad_w - left,
            top,
            bottom,
        }
    }

    /// Dimensions after padding.
    pub fn padded_dims(&self) -> (u32, u32) {
        (
            self.width + self.left + self.right,
            self.height + self.top + self.bottom,
        )
    }

    /// Whether any padding is applied.
    pub fn is_identity(&self) -> bool {
        self.left + self.right + self.top + self.bottom == 0
    }

    /// Pad `image`, repeating edge pixels outward.
    pub fn pad(&self, image: &RgbImage) -> RgbImage {
        if self.is_identity() {
            return image.clone();
        }
        let (padded_w, padded_h) = self.padded_dims();
        let max_x = self.width.saturating_sub(1) as i64;
        let max_y = self.height.saturating_sub(1) as i64;

        RgbImage::from_fn(padded_w, padded_h, |x, y| {
            let src_x = (x as i64 - self.left as i64).clamp(0, max_x) as u32;
            let src_y = (y as i64 - self.top as i64).clamp(0, max_y) as u32;
            *image.get_pixel(src_x, src_y)
        })
    }

    /// Crop a field estimated on padded input back to the original size.
    pub fn unpad(&self, field: &FlowField) -> MediaResult<FlowField> {
        field.crop(
            self.left as usize,
            self.top as usize,
            self.width as usize,
            self.height as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sintel_padding_split() {
        let padder = InputPadder::new(13, 10, PadMode::Sintel, 8);
        assert_eq!(padder.padded_dims(), (16, 16));
        assert_eq!((padder.left, padder.right), (1, 2));
        assert_eq!((padder.top, padder.bottom), (3, 3));
    }

    #[test]
    fn test_kitti_pads_bottom_only() {
        let padder = InputPadder::new(13, 10, PadMode::Kitti, 8);
        assert_eq!((padder.top, padder.bottom), (0, 6));
    }

    #[test]
    fn test_aligned_input_is_identity() {
        let padder = InputPadder::new(64, 48, PadMode::Sintel, 8);
        assert!(padder.is_identity());
        assert_eq!(padder.padded_dims(), (64, 48));
    }

    #[test]
    fn test_pad_replicates_edges() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([10, 0, 0]));
        image.put_pixel(1, 0, image::Rgb([20, 0, 0]));

        let padder = InputPadder::new(2, 1, PadMode::Sintel, 4);
        let padded = padder.pad(&image);
        assert_eq!(padded.dimensions(), (4, 4));
        assert_eq!(padded.get_pixel(0, 0)[0], 10);
        assert_eq!(padded.get_pixel(3, 3)[0], 20);
    }

    #[test]
    fn test_unpad_restores_original_window() {
        let padder = InputPadder::new(13, 10, PadMode::Sintel, 8);
        let (w, h) = padder.padded_dims();
        let mut field = FlowField::zeros(w as usize, h as usize);
        // First original pixel sits at (left, top)
        field.set(1, 3, 5.0, -5.0);

        let cropped = padder.unpad(&field).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (13, 10));
        assert_eq!(cropped.get(0, 0), (5.0, -5.0));
    }
}
