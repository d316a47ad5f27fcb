//! Dense 2-D motion field.

use ndarray::{s, Array3, ArrayView2};

use crate::error::{MediaError, MediaResult};

/// Per-pixel displacement between two frames.
///
/// Stored planar as `[2, H, W]`: channel 0 is horizontal motion (positive =
/// right), channel 1 is vertical motion (positive = down).
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    data: Array3<f32>,
}

impl FlowField {
    /// Zero motion everywhere.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((2, height, width)),
        }
    }

    /// Build from planar `[2, H, W]` data, as flow networks emit it.
    pub fn from_planar(width: usize, height: usize, data: Vec<f32>) -> MediaResult<Self> {
        let expected = 2 * width * height;
        if data.len() != expected {
            return Err(MediaError::internal(format!(
                "Flow output has {} values, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        let data = Array3::from_shape_vec((2, height, width), data)
            .map_err(|e| MediaError::internal(format!("Invalid flow shape: {}", e)))?;
        Ok(Self { data })
    }

    /// Uniform motion, mainly for tests and synthetic input.
    pub fn constant(width: usize, height: usize, dx: f32, dy: f32) -> Self {
        let mut field = Self::zeros(width, height);
        field.data.slice_mut(s![0, .., ..]).fill(dx);
        field.data.slice_mut(s![1, .., ..]).fill(dy);
        field
    }

    pub fn width(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    /// Displacement at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> (f32, f32) {
        (self.data[[0, y, x]], self.data[[1, y, x]])
    }

    pub fn set(&mut self, x: usize, y: usize, dx: f32, dy: f32) {
        self.data[[0, y, x]] = dx;
        self.data[[1, y, x]] = dy;
    }

    pub fn dx(&self) -> ArrayView2<'_, f32> {
        self.data.slice(s![0, .., ..])
    }

    pub fn dy(&self) -> ArrayView2<'_, f32> {
        self.data.slice(s![1, .., ..])
    }

    /// Largest displacement magnitude in the field.
    pub fn max_magnitude(&self) -> f32 {
        self.dx()
            .iter()
            .zip(self.dy().iter())
            .map(|(u, v)| (u * u + v * v).sqrt())
            .fold(0.0, f32::max)
    }

    /// Copy of the `width x height` window whose top-left corner is `(x, y)`.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> MediaResult<Self> {
        if x + width > self.width() || y + height > self.height() {
            return Err(MediaError::internal(format!(
                "Crop {}x{}+{}+{} exceeds flow field {}x{}",
                width,
                height,
                x,
                y,
                self.width(),
                self.height()
            )));
        }
        Ok(Self {
            data: self
                .data
                .slice(s![.., y..y + height, x..x + width])
                .to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_planar_layout() {
        // 2x1 field: dx = [1, 2], dy = [3, 4]
        let field = FlowField::from_planar(2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(field.get(0, 0), (1.0, 3.0));
        assert_eq!(field.get(1, 0), (2.0, 4.0));
        assert!(FlowField::from_planar(2, 2, vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_max_magnitude() {
        let mut field = FlowField::zeros(3, 3);
        field.set(1, 2, 3.0, -4.0);
        assert_eq!(field.max_magnitude(), 5.0);
        assert_eq!(FlowField::zeros(2, 2).max_magnitude(), 0.0);
    }

    #[test]
    fn test_crop() {
        let mut field = FlowField::zeros(4, 4);
        field.set(2, 1, 7.0, 8.0);
        let cropped = field.crop(1, 1, 2, 3).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (2, 3));
        assert_eq!(cropped.get(1, 0), (7.0, 8.0));
        assert!(field.crop(3, 0, 2, 1).is_err());
    }
}
