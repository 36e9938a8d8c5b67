mod loopback;

pub use loopback::LoopbackPreview;

use anyhow::Result;
use image::RgbImage;

/// Where live previews of the composite go
pub trait PreviewSink {
    /// Show a rendered composite
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Nothing to show (no background locked)
    fn clear(&mut self) -> Result<()>;
}
