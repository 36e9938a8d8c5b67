use super::CaptureSource;
use anyhow::{bail, Result};
use image::RgbImage;
use std::collections::VecDeque;

/// Frames from memory: plays a queue, then keeps returning the last frame.
///
/// Stands in for a camera when driving a session from stills.
#[derive(Debug, Default)]
pub struct StillFrames {
    queue: VecDeque<RgbImage>,
    last: Option<RgbImage>,
}

impl StillFrames {
    pub fn new(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            queue: frames.into_iter().collect(),
            last: None,
        }
    }
}

impl CaptureSource for StillFrames {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        if let Some(frame) = self.queue.pop_front() {
            self.last = Some(frame.clone());
            return Ok(frame);
        }
        match &self.last {
            Some(frame) => Ok(frame.clone()),
            None => bail!("no frames available"),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        self.queue
            .front()
            .or(self.last.as_ref())
            .map(|f| f.dimensions())
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_queue_then_repeats_last() {
        let mut src = StillFrames::new([RgbImage::new(2, 2), RgbImage::new(3, 1)]);
        assert_eq!(src.resolution(), (2, 2));
        assert_eq!(src.capture_frame().unwrap().dimensions(), (2, 2));
        assert_eq!(src.capture_frame().unwrap().dimensions(), (3, 1));
        assert_eq!(src.capture_frame().unwrap().dimensions(), (3, 1));
        assert_eq!(src.resolution(), (3, 1));
    }

    #[test]
    fn empty_source_errors() {
        assert!(StillFrames::default().capture_frame().is_err());
    }
}
