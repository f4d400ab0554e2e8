//! Pixel dimensions and the output resolution ceiling.

use crate::error::{Result, UpscalerError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 3840x2160.
    pub const UHD_4K: Self = Self::new(3840, 2160);
    /// 7680x4320.
    pub const UHD_8K: Self = Self::new(7680, 4320);

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    #[inline]
    pub const fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Total pixel count in millions.
    #[inline]
    pub fn megapixels(self) -> f64 {
        self.pixels() as f64 / 1_000_000.0
    }

    /// Dimensions multiplied by `scale`, rounded, never below one pixel.
    pub fn scaled(self, scale: f64) -> Self {
        Self {
            width: scale_dimension(self.width, scale),
            height: scale_dimension(self.height, scale),
        }
    }

    /// Dimensions multiplied by an integer ratio.
    pub fn times(self, ratio: u32) -> Self {
        Self {
            width: self.width.saturating_mul(ratio),
            height: self.height.saturating_mul(ratio),
        }
    }

    /// Enforce the total-pixel output ceiling.
    ///
    /// Only the pixel count is limited, so portrait outputs taller than 4320
    /// pass as long as they stay within the 8K pixel budget.
    pub fn check_output_ceiling(self) -> Result<()> {
        if self.pixels() > MAX_OUTPUT_PIXELS {
            return Err(UpscalerError::ResolutionLimit {
                width: self.width,
                height: self.height,
                megapixels: self.megapixels(),
                limit: MAX_OUTPUT_MEGAPIXELS,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Largest permitted output, in pixels (7680x4320).
pub const MAX_OUTPUT_PIXELS: u64 = Resolution::UHD_8K.pixels();

/// Human-readable label for [`MAX_OUTPUT_PIXELS`].
pub const MAX_OUTPUT_MEGAPIXELS: f64 = 33.2;

/// `round(dimension * scale)`, clamped to at least 1.
pub fn scale_dimension(dimension: u32, scale: f64) -> u32 {
    let scaled = (dimension as f64 * scale).round();
    if scaled < 1.0 {
        1
    } else if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}
