#[cfg(feature = "onnx")]
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
#[cfg(feature = "onnx")]
mod selfie;
pub mod types;
mod worker;

#[cfg(feature = "onnx")]
pub use preprocess::{Preprocessor, TensorLayout};
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
#[cfg(feature = "onnx")]
pub use selfie::SelfieSegmenter;
pub use types::{Mask, SegmentationModel};
pub(crate) use worker::panic_message;
pub use worker::{Completion, SegmentationWorker};

/// Which ONNX backend to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelKind {
    /// RobustVideoMatting
    Rvm,
    /// MediaPipe selfie segmentation (landscape)
    Selfie,
}

/// Build an inference session for `path`, on the GPU when CUDA is usable.
///
/// ort falls back to the CPU provider (and logs why) when CUDA cannot be
/// registered, so a missing GPU is not an error here.
#[cfg(feature = "onnx")]
pub(crate) fn onnx_session(path: &std::path::Path, intra_threads: usize) -> anyhow::Result<ort::session::Session> {
    use anyhow::Context;
    use ort::execution_providers::CUDAExecutionProvider;
    use ort::session::builder::GraphOptimizationLevel;

    ort::session::Session::builder()?
        .with_execution_providers([CUDAExecutionProvider::default().build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))
}

/// Load a segmentation model of the given kind.
#[cfg(feature = "onnx")]
pub fn create_model(
    kind: ModelKind,
    model_path: &str,
) -> anyhow::Result<Box<dyn SegmentationModel + Send>> {
    Ok(match kind {
        ModelKind::Rvm => Box::new(RobustVideoMatting::new(model_path)?),
        ModelKind::Selfie => Box::new(SelfieSegmenter::new(model_path)?),
    })
}
