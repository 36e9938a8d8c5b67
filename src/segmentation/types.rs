use anyhow::{ensure, Result};
use image::RgbImage;

/// Foreground matte: 0.0 = background, 1.0 = foreground, row-major.
///
/// Dimensions are those the model produced; they need not match the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Mask {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "mask is empty ({width}x{height})");
        ensure!(
            values.len() == width as usize * height as usize,
            "mask has {} values, expected {}x{}",
            values.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Result<Self> {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(f(x, y));
            }
        }
        Self::new(width, height, values)
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Result<Self> {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, MediaPipe selfie, ...)
pub trait SegmentationModel {
    /// Compute a foreground mask for one frame.
    ///
    /// Implementations are not required to be reentrant; callers run at
    /// most one `segment` per instance at a time.
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask>;

    /// Reset internal state (for models with temporal/recurrent components)
    fn reset_state(&mut self) {}

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
