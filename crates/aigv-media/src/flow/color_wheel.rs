//! Colour-wheel visualisation of flow fields.
//!
//! Implements the Middlebury flow colour coding (Baker et al., ICCV 2007):
//! direction selects a hue on a 55-entry wheel, magnitude relative to the
//! largest vector in the field selects saturation. Zero motion is white.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::field::FlowField;

const RY: usize = 15;
const YG: usize = 6;
const GC: usize = 4;
const CB: usize = 11;
const BM: usize = 13;
const MR: usize = 6;
const NCOLS: usize = RY + YG + GC + CB + BM + MR;

/// Added to the maximum magnitude before normalising.
const EPSILON: f64 = 1e-5;

/// Channel order written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Converts [`FlowField`]s into RGB images.
#[derive(Debug, Clone)]
pub struct FlowRenderer {
    wheel: [[f64; 3]; NCOLS],
    order: ChannelOrder,
    clip: Option<f32>,
}

impl Default for FlowRenderer {
    fn default() -> Self {
        Self::new(ChannelOrder::Rgb)
    }
}

impl FlowRenderer {
    pub fn new(order: ChannelOrder) -> Self {
        Self {
            wheel: make_color_wheel(),
            order,
            clip: None,
        }
    }

    /// Clamp each flow component to `[-clip, clip]` before rendering.
    pub fn with_clip(mut self, clip: f32) -> Self {
        self.clip = Some(clip.abs());
        self
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// Render `field` at its own resolution.
    pub fn render(&self, field: &FlowField) -> RgbImage {
        let clip = |v: f32| match self.clip {
            Some(c) => v.clamp(-c, c),
            None => v,
        };

        let max_magnitude = match self.clip {
            Some(_) => {
                let (dx, dy) = (field.dx(), field.dy());
                dx.iter()
                    .zip(dy.iter())
                    .map(|(&u, &v)| {
                        let (u, v) = (clip(u), clip(v));
                        (u * u + v * v).sqrt()
                    })
                    .fold(0.0f32, f32::max)
            }
            None => field.max_magnitude(),
        } as f64;
        let scale = max_magnitude + EPSILON;

        let mut image = RgbImage::new(field.width() as u32, field.height() as u32);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let (u, v) = field.get(x as usize, y as usize);
            let u = clip(u) as f64 / scale;
            let v = clip(v) as f64 / scale;
            *pixel = self.color_for(u, v);
        }
        image
    }

    /// Colour for a normalised displacement.
    fn color_for(&self, u: f64, v: f64) -> Rgb<u8> {
        let rad = (u * u + v * v).sqrt();
        let a = (-v).atan2(-u) / std::f64::consts::PI;
        let fk = (a + 1.0) / 2.0 * (NCOLS - 1) as f64;
        let k0 = (fk.floor() as usize).min(NCOLS - 1);
        let k1 = if k0 + 1 == NCOLS { 0 } else { k0 + 1 };
        let f = fk - k0 as f64;

        let mut out = [0u8; 3];
        for (channel, value) in out.iter_mut().enumerate() {
            let col0 = self.wheel[k0][channel] / 255.0;
            let col1 = self.wheel[k1][channel] / 255.0;
            let mut col = (1.0 - f) * col0 + f * col1;
            if rad <= 1.0 {
                col = 1.0 - rad * (1.0 - col);
            } else {
                // Out of range
                col *= 0.75;
            }
            *value = (255.0 * col).floor().clamp(0.0, 255.0) as u8;
        }

        match self.order {
            ChannelOrder::Rgb => Rgb(out),
            ChannelOrder::Bgr => Rgb([out[2], out[1], out[0]]),
        }
    }
}

/// The 55-hue Middlebury wheel, one RGB triple per row.
fn make_color_wheel() -> [[f64; 3]; NCOLS] {
    let mut wheel = [[0.0; 3]; NCOLS];
    let ramp = |i: usize, n: usize| (255.0 * i as f64 / n as f64).floor();
    let mut col = 0;

    for i in 0..RY {
        wheel[col + i] = [255.0, ramp(i, RY), 0.0];
    }
    col += RY;
    for i in 0..YG {
        wheel[col + i] = [255.0 - ramp(i, YG), 255.0, 0.0];
    }
    col += YG;
    for i in 0..GC {
        wheel[col + i] = [0.0, 255.0, ramp(i, GC)];
    }
    col += GC;
    for i in 0..CB {
        wheel[col + i] = [0.0, 255.0 - ramp(i, CB), 255.0];
    }
    col += CB;
    for i in 0..BM {
        wheel[col + i] = [ramp(i, BM), 0.0, 255.0];
    }
    col += BM;
    for i in 0..MR {
        wheel[col + i] = [255.0, 0.0, 255.0 - ramp(i, MR)];
    }

    wheel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_segments() {
        let wheel = make_color_wheel();
        assert_eq!(NCOLS, 55);
        assert_eq!(wheel[0], [255.0, 0.0, 0.0]);
        assert_eq!(wheel[RY], [255.0, 255.0, 0.0]);
        assert_eq!(wheel[RY + YG], [0.0, 255.0, 0.0]);
        assert_eq!(wheel[NCOLS - 1], [255.0, 0.0, 43.0]);
    }

    #[test]
    fn test_zero_flow_is_white() {
        let image = FlowRenderer::default().render(&FlowField::zeros(4, 3));
        assert_eq!(image.dimensions(), (4, 3));
        assert!(image.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_rightward_flow_is_red() {
        let image = FlowRenderer::default().render(&FlowField::constant(2, 2, 2.0, 0.0));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn test_bgr_swaps_channels() {
        let field = FlowField::constant(1, 1, 2.0, 0.0);
        let image = FlowRenderer::new(ChannelOrder::Bgr).render(&field);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_small_vectors_are_desaturated() {
        let mut field = FlowField::zeros(2, 1);
        field.set(0, 0, 4.0, 0.0);
        field.set(1, 0, 1.0, 0.0);
        let image = FlowRenderer::default().render(&field);
        let strong = image.get_pixel(0, 0);
        let weak = image.get_pixel(1, 0);
        assert_eq!(strong[0], 255);
        assert!(weak[1] > strong[1]);
    }

    #[test]
    fn test_clip_limits_dominant_vector() {
        let mut field = FlowField::zeros(2, 1);
        field.set(0, 0, 100.0, 0.0);
        field.set(1, 0, 1.0, 0.0);
        let plain = FlowRenderer::default().render(&field);
        let clipped = FlowRenderer::default().with_clip(1.0).render(&field);
        // With the outlier clipped both vectors have full saturation
        assert_eq!(clipped.get_pixel(1, 0).0, [255, 0, 0]);
        assert!(plain.get_pixel(1, 0)[1] > 200);
    }
}
