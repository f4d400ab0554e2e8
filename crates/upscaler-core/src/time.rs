//! Frame rate representation.
//!
//! Containers report rates as rationals (`30000/1001`), so the rate is kept
//! as a numerator/denominator pair and only converted to `f64` for display
//! and duration math.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A video frame rate as a rational number of frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 30000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Approximate a floating-point rate with millisecond precision.
    pub fn from_fps_f64(fps: f64) -> Self {
        if !fps.is_finite() || fps <= 0.0 {
            return Self::ZERO;
        }
        if (fps - fps.round()).abs() < 1e-6 {
            return Self::new(fps.round() as u32, 1);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    /// Parse FFmpeg's `num/den` notation (or a bare number).
    ///
    /// Returns `None` for malformed input or a zero denominator.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((num, den)) => {
                let num: u32 = num.trim().parse().ok()?;
                let den: u32 = den.trim().parse().ok()?;
                if den == 0 {
                    return None;
                }
                Some(Self::new(num, den))
            }
            None => {
                let fps: f64 = s.parse().ok()?;
                Some(Self::from_fps_f64(fps))
            }
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// Whether this rate can be used to time frames.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// The rate multiplied by an integer factor (used by interpolation).
    pub fn multiplied(self, factor: u32) -> Self {
        Self::new(self.numerator.saturating_mul(factor), self.denominator)
    }

    /// Unknown rate.
    pub const ZERO: Self = Self::new(0, 1);

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
