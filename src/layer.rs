//! Person layers and the extractor that cuts them out of captured frames.

use crate::config::ExtractorSettings;
use crate::error::{GroupShotError, GroupShotResult};
use crate::segmentation::Mask;
use image::{imageops, ImageBuffer, Luma, Rgba, RgbImage, RgbaImage};

/// RGBA cutout of one person, straight (non-premultiplied) alpha.
///
/// Pixels outside the foreground are fully transparent but keep their
/// color; compositing only ever looks at alpha.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    image: RgbaImage,
}

impl Layer {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl AsRef<Layer> for Layer {
    fn as_ref(&self) -> &Layer {
        self
    }
}

/// Turns a frame and its mask into a [`Layer`].
///
/// Pure given its settings: the same frame and mask always produce the
/// same layer.
#[derive(Debug, Clone)]
pub struct LayerExtractor {
    settings: ExtractorSettings,
    kernel: Vec<f32>,
}

impl LayerExtractor {
    pub fn new(settings: ExtractorSettings) -> GroupShotResult<Self> {
        settings.validate()?;
        let kernel = gaussian_kernel(settings.blur_radius, settings.sigma());
        Ok(Self { settings, kernel })
    }

    pub fn extract(&self, frame: &RgbImage, mask: &Mask) -> GroupShotResult<Layer> {
        let _span = tracing::debug_span!("extract_layer").entered();

        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(GroupShotError::segmentation("frame is empty"));
        }

        let mut alpha = resample_mask(mask, width, height)?;
        for a in alpha.iter_mut() {
            *a = if a.is_finite() { a.clamp(0.0, 1.0) } else { 0.0 };
        }
        if self.kernel.len() > 1 {
            alpha = blur_separable(&alpha, width, height, &self.kernel);
        }

        let tone = self.settings.adjusts_tone();
        let (brightness, contrast) = (self.settings.brightness, self.settings.contrast);

        let image = RgbaImage::from_fn(width, height, |x, y| {
            let p = frame.get_pixel(x, y);
            let a = alpha[(y * width + x) as usize];
            let [r, g, b] = if tone {
                [
                    adjust(p[0], brightness, contrast),
                    adjust(p[1], brightness, contrast),
                    adjust(p[2], brightness, contrast),
                ]
            } else {
                p.0
            };
            Rgba([r, g, b, unit_to_u8(a)])
        });

        tracing::debug!(
            "Extracted {}x{} layer from {}x{} mask",
            width,
            height,
            mask.dimensions().0,
            mask.dimensions().1
        );

        Ok(Layer::new(image))
    }
}

fn resample_mask(mask: &Mask, width: u32, height: u32) -> GroupShotResult<Vec<f32>> {
    let (mw, mh) = mask.dimensions();
    if (mw, mh) == (width, height) {
        return Ok(mask.values().to_vec());
    }

    let gray: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(mw, mh, mask.values().to_vec())
            .ok_or_else(|| GroupShotError::segmentation("mask buffer does not match its size"))?;

    // Bilinear keeps the result inside the input range, unlike Lanczos.
    let resized = imageops::resize(&gray, width, height, imageops::FilterType::Triangle);
    Ok(resized.into_raw())
}

fn gaussian_kernel(radius: u32, sigma: f32) -> Vec<f32> {
    if radius == 0 {
        return vec![1.0];
    }

    let r = radius as i32;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f32> = (-r..=r)
        .map(|i| {
            let x = i as f32;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= sum;
    }
    weights
}

/// Two-pass blur, edges clamped.
fn blur_separable(src: &[f32], width: u32, height: u32, kernel: &[f32]) -> Vec<f32> {
    let radius = (kernel.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    let mut tmp = vec![0.0f32; src.len()];
    let mut out = vec![0.0f32; src.len()];

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kw) in kernel.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                acc += kw * src[(y * w + sx) as usize];
            }
            tmp[(y * w + x) as usize] = acc;
        }
    }

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kw) in kernel.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                acc += kw * tmp[(sy * w + x) as usize];
            }
            out[(y * w + x) as usize] = acc.clamp(0.0, 1.0);
        }
    }

    out
}

fn adjust(c: u8, brightness: f32, contrast: f32) -> u8 {
    let v = ((c as f32 - 127.5) * contrast + 127.5) * brightness;
    v.round().clamp(0.0, 255.0) as u8
}

fn unit_to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 200]))
    }

    fn sharp() -> LayerExtractor {
        LayerExtractor::new(ExtractorSettings::passthrough()).unwrap()
    }

    #[test]
    fn huge_blur_radius_is_rejected_up_front() {
        let settings = ExtractorSettings {
            blur_radius: u32::MAX,
            ..ExtractorSettings::default()
        };
        assert!(matches!(
            LayerExtractor::new(settings),
            Err(GroupShotError::InvalidSettings(_))
        ));
    }

    #[test]
    fn full_mask_keeps_every_pixel() {
        let f = frame(4, 3);
        let layer = sharp().extract(&f, &Mask::filled(4, 3, 1.0).unwrap()).unwrap();
        assert_eq!(layer.dimensions(), (4, 3));
        for (x, y, p) in layer.image().enumerate_pixels() {
            let src = f.get_pixel(x, y);
            assert_eq!(p.0, [src[0], src[1], src[2], 255]);
        }
    }

    #[test]
    fn transparent_pixels_keep_color() {
        let f = frame(3, 3);
        let layer = sharp().extract(&f, &Mask::filled(3, 3, 0.0).unwrap()).unwrap();
        let p = layer.image().get_pixel(2, 1);
        assert_eq!(p.0, [20, 10, 200, 0]);
    }

    #[test]
    fn out_of_range_mask_values_are_clamped() {
        let f = frame(2, 1);
        let mask = Mask::new(2, 1, vec![f32::NAN, 7.0]).unwrap();
        let layer = sharp().extract(&f, &mask).unwrap();
        assert_eq!(layer.image().get_pixel(0, 0)[3], 0);
        assert_eq!(layer.image().get_pixel(1, 0)[3], 255);
    }

    #[test]
    fn mask_is_resampled_to_frame() {
        let f = frame(8, 6);
        let layer = sharp().extract(&f, &Mask::filled(2, 2, 1.0).unwrap()).unwrap();
        assert_eq!(layer.dimensions(), (8, 6));
        assert!(layer.image().pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn softening_blurs_hard_edges() {
        let f = frame(10, 1);
        let mask = Mask::from_fn(10, 1, |x, _| if x < 5 { 0.0 } else { 1.0 }).unwrap();
        let soft = LayerExtractor::new(ExtractorSettings::default()).unwrap();
        let layer = soft.extract(&f, &mask).unwrap();

        let edge = layer.image().get_pixel(5, 0)[3];
        assert!(edge > 0 && edge < 255, "edge alpha {edge}");
        assert_eq!(layer.image().get_pixel(0, 0)[3], 0);
        assert_eq!(layer.image().get_pixel(9, 0)[3], 255);
    }

    #[test]
    fn softening_leaves_uniform_mask_alone() {
        let f = frame(6, 6);
        let soft = LayerExtractor::new(ExtractorSettings::default()).unwrap();
        let layer = soft.extract(&f, &Mask::filled(6, 6, 1.0).unwrap()).unwrap();
        assert!(layer.image().pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn extraction_is_deterministic() {
        let f = frame(7, 5);
        let mask = Mask::from_fn(3, 3, |x, y| ((x + y) % 2) as f32).unwrap();
        let ex = LayerExtractor::new(ExtractorSettings {
            brightness: 1.1,
            contrast: 1.2,
            ..ExtractorSettings::default()
        })
        .unwrap();
        assert_eq!(ex.extract(&f, &mask).unwrap(), ex.extract(&f, &mask).unwrap());
    }

    #[test]
    fn tone_adjustment_is_uniform() {
        let f = RgbImage::from_pixel(2, 2, Rgb([100, 0, 250]));
        let ex = LayerExtractor::new(ExtractorSettings {
            brightness: 2.0,
            ..ExtractorSettings::passthrough()
        })
        .unwrap();
        let layer = ex.extract(&f, &Mask::filled(2, 2, 1.0).unwrap()).unwrap();
        assert!(layer.image().pixels().all(|p| p.0 == [200, 0, 255, 255]));
    }

    #[test]
    fn kernel_is_normalized() {
        let k = gaussian_kernel(3, 1.5);
        assert_eq!(k.len(), 7);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(gaussian_kernel(0, 1.0), vec![1.0]);
    }
}
