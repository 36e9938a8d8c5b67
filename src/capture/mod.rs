mod still;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use still::StillFrames;
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Snapshot of the current input. Each call returns a new, owned frame.
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    ///
    /// May change when the underlying device is switched.
    fn resolution(&self) -> (u32, u32);
}
