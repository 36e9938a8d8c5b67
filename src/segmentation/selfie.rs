use super::preprocess::{Preprocessor, TensorLayout};
use super::types::{Mask, SegmentationModel};
use anyhow::{ensure, Context, Result};
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// MediaPipe selfie segmentation, landscape variant.
///
/// Input is a 256x144 NHWC frame in [0, 1]; output is one confidence
/// channel at the same resolution.
pub struct SelfieSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
}

impl SelfieSegmenter {
    pub const LANDSCAPE_SIZE: (u32, u32) = (256, 144);

    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading selfie segmentation model from {}", path.display());

        let session = super::onnx_session(path, 2)?;

        let (width, height) = Self::LANDSCAPE_SIZE;
        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height, TensorLayout::Nhwc),
            width,
            height,
        })
    }
}

impl SegmentationModel for SelfieSegmenter {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("selfie_segment").entered();

        let input = Tensor::from_array(self.preprocessor.preprocess(frame)?)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("Failed to run inference")?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("selfie model produced no output")?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        // [1, H, W, 1]
        ensure!(dims.len() == 4 && dims[3] == 1, "unexpected mask shape {dims:?}");

        Mask::new(dims[2] as u32, dims[1] as u32, data.to_vec())
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
