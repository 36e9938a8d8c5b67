use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::path::Path;

/// File name the finished group photo is saved under by default.
pub const DEFAULT_EXPORT_NAME: &str = "ScattoGo_Pro_Final.png";

/// Serializes a rendered composite.
pub trait Exporter {
    fn export(&self, image: &RgbImage) -> Result<Vec<u8>>;

    /// File extension, without the dot
    fn extension(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PngExporter;

impl Exporter for PngExporter {
    fn export(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let (width, height) = image.dimensions();
        PngEncoder::new(&mut bytes)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .context("Failed to encode PNG")?;
        Ok(bytes)
    }

    fn extension(&self) -> &'static str {
        "png"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JpegExporter {
    pub quality: u8,
}

impl Default for JpegExporter {
    fn default() -> Self {
        Self { quality: 92 }
    }
}

impl Exporter for JpegExporter {
    fn export(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let (width, height) = image.dimensions();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .context("Failed to encode JPEG")?;
        Ok(bytes)
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

/// Pick an exporter from the output file's extension, PNG by default.
pub fn exporter_for_path(path: &Path) -> Box<dyn Exporter> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => Box::new(JpegExporter::default()),
        _ => Box::new(PngExporter),
    }
}

pub fn save(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
