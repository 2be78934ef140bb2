use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::application::ports::FrameSource;
use crate::domain::{camera::FrameSize, errors::DomainResult, frame::Frame};

pub const SYNTHETIC_GRAY: Rgb<u8> = Rgb([64, 64, 64]);

/// Genera `frames` imágenes grises y después señala fin de stream.
pub struct SyntheticSource {
    frames: u32,
    size: FrameSize,
    interval: Duration,
    produced: u32,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(frames: u32, size: FrameSize, interval_ms: u64) -> Self {
        Self {
            frames,
            size,
            interval: Duration::from_millis(interval_ms),
            produced: 0,
            closed: false,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self) -> DomainResult<Option<Frame>> {
        if self.closed || self.produced >= self.frames {
            return Ok(None);
        }
        if self.produced > 0 && !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        self.produced += 1;
        let image = RgbImage::from_pixel(self.size.width, self.size.height, SYNTHETIC_GRAY);
        Ok(Some(Frame::new(u64::from(self.produced), image)))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_numbered_frames_then_end_of_stream() {
        let mut source = SyntheticSource::new(3, FrameSize { width: 4, height: 2 }, 0);
        let indices: Vec<u64> = std::iter::from_fn(|| source.read().unwrap()).map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn closed_source_stops_producing() {
        let mut source = SyntheticSource::new(10, FrameSize { width: 4, height: 2 }, 0);
        source.read().unwrap();
        source.close();
        assert!(source.read().unwrap().is_none());
    }
}
