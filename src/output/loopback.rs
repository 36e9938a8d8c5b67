use super::PreviewSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Preview written to a v4l2loopback device as raw YUYV frames.
pub struct LoopbackPreview {
    file: File,
    width: u32,
    height: u32,
}

impl LoopbackPreview {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening preview device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open preview device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
        })
    }

    fn write_rgb(&mut self, frame: &RgbImage) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            &resized
        } else {
            frame
        };

        self.file
            .write_all(&rgb_to_yuyv(frame))
            .context("Failed to write frame to preview device")
    }
}

impl PreviewSink for LoopbackPreview {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        self.write_rgb(frame)
    }

    fn clear(&mut self) -> Result<()> {
        let black = RgbImage::new(self.width, self.height);
        self.write_rgb(&black)
    }
}

/// Pack RGB into YUV 4:2:2 (Y0 U Y1 V), chroma averaged per pixel pair.
pub(crate) fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let pixel1 = rgb_image.get_pixel(x, y);
            let pixel2 = if x + 1 < width {
                rgb_image.get_pixel(x + 1, y)
            } else {
                pixel1
            };

            let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
            let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn yuyv_is_two_bytes_per_pixel() {
        let img = RgbImage::new(4, 3);
        assert_eq!(rgb_to_yuyv(&img).len(), 4 * 3 * 2);
    }

    #[test]
    fn grey_has_neutral_chroma() {
        let img = RgbImage::from_pixel(2, 1, Rgb([128, 128, 128]));
        let out = rgb_to_yuyv(&img);
        assert_eq!(out[0], out[2]);
        assert!((out[1] as i32 - 128).abs() <= 1);
        assert!((out[3] as i32 - 128).abs() <= 1);
    }
}
