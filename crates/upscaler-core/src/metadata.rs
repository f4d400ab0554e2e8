//! Immutable description of a source video.

use crate::resolution::Resolution;
use crate::time::FrameRate;
use serde::{Deserialize, Serialize};

/// Metadata read once from a source container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub frame_count: u64,
    /// Seconds; `frame_count / fps`, or 0 when the rate is unknown.
    pub duration: f64,
}

impl VideoMetadata {
    /// Build metadata, deriving the duration from count and rate.
    pub fn new(width: u32, height: u32, frame_rate: FrameRate, frame_count: u64) -> Self {
        let fps = frame_rate.to_fps_f64();
        let duration = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        Self {
            width,
            height,
            frame_rate,
            frame_count,
            duration,
        }
    }

    /// Source dimensions.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Frames per second as f64.
    #[inline]
    pub fn fps(&self) -> f64 {
        self.frame_rate.to_fps_f64()
    }

    /// Number of frames covering the first `seconds` of the video.
    pub fn frames_in(&self, seconds: f64) -> u64 {
        let n = (self.fps() * seconds.max(0.0)).floor() as u64;
        n.min(self.frame_count)
    }
}
