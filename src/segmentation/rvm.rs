use super::preprocess::{Preprocessor, TensorLayout};
use super::types::{Mask, SegmentationModel};
use anyhow::{ensure, Context, Result};
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// RVM is recurrent, but each capture here is an independent still, so the
/// hidden states are fed as zeros on every call rather than carried over.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512
    /// - Downsample ratio: 0.25
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = super::onnx_session(path, 4)?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height, TensorLayout::Nchw),
            width,
            height,
            downsample_ratio: 0.25,
        })
    }

    fn zero_state() -> Result<Tensor<f32>> {
        Ok(Tensor::from_array(([1usize, 1, 1, 1], vec![0.0f32]))?)
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let input = Tensor::from_array(self.preprocessor.preprocess(frame)?)?;
        let ratio = Tensor::from_array(([1usize], vec![self.downsample_ratio]))?;

        // Inputs: src, r1i..r4i, downsample_ratio
        // Outputs: fgr, pha, r1o..r4o
        let outputs = self
            .session
            .run(ort::inputs![
                input,
                Self::zero_state()?,
                Self::zero_state()?,
                Self::zero_state()?,
                Self::zero_state()?,
                ratio
            ])
            .context("Failed to run inference")?;

        let (shape, data) = outputs[1]
            .try_extract_tensor::<f32>()
            .context("RVM produced no alpha output")?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        ensure!(dims.len() == 4, "unexpected alpha shape {dims:?}");

        let matte_height = dims[2] as u32;
        let matte_width = dims[3] as u32;
        Mask::new(matte_width, matte_height, data.to_vec())
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
