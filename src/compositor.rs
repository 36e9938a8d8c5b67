use crate::error::{GroupShotError, GroupShotResult};
use crate::layer::Layer;
use image::{Rgb, RgbImage, Rgba};
use std::sync::Arc;

/// Blend one straight-alpha pixel over an opaque one.
pub fn over(dst: Rgb<u8>, src: Rgba<u8>) -> Rgb<u8> {
    let a = u16::from(src[3]);
    match a {
        0 => dst,
        255 => Rgb([src[0], src[1], src[2]]),
        _ => {
            let inv = 255 - a;
            let mut out = [0u8; 3];
            for i in 0..3 {
                out[i] = mul_div255(u16::from(src[i]), a) + mul_div255(u16::from(dst[i]), inv);
            }
            Rgb(out)
        }
    }
}

/// Draw `layers` onto a copy of `background`, first to last.
///
/// The result is as large as the background and fully opaque. An empty
/// layer list returns the background unchanged.
pub fn compose<L: AsRef<Layer>>(background: &RgbImage, layers: &[L]) -> GroupShotResult<RgbImage> {
    let _span = tracing::debug_span!("compose", layers = layers.len()).entered();

    let mut out = background.clone();
    for layer in layers {
        let layer = layer.as_ref();
        if layer.dimensions() != out.dimensions() {
            return Err(GroupShotError::DimensionMismatch {
                expected: out.dimensions(),
                actual: layer.dimensions(),
            });
        }
        for (d, s) in out.pixels_mut().zip(layer.image().pixels()) {
            *d = over(*d, *s);
        }
    }
    Ok(out)
}

/// Frozen view of a composition: what `render` draws from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub background: Arc<RgbImage>,
    pub layers: Vec<Arc<Layer>>,
}

impl Snapshot {
    pub fn compose(&self) -> GroupShotResult<RgbImage> {
        compose(&self.background, self.layers.as_slice())
    }
}

// (x*y)/255 rounded; never exceeds 255 - (other term) for complementary weights
fn mul_div255(x: u16, y: u16) -> u8 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u8
}
