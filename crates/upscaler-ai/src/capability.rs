//! Capability interfaces consumed by the pipeline.
//!
//! An enhancer magnifies a frame by a fixed native ratio. An interpolator
//! synthesizes frames between two neighbours. Both are created once per run
//! and reused for every frame.

use crate::error::{AiError, AiResult};
use serde::{Deserialize, Serialize};
use upscaler_core::{Frame, Resolution};

/// Magnification an enhancement model is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeRatio {
    X2,
    X4,
}

impl NativeRatio {
    /// Integer magnification.
    pub fn factor(self) -> u32 {
        match self {
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    /// Map 2 or 4 to a ratio.
    pub fn from_factor(factor: u32) -> Option<Self> {
        match factor {
            2 => Some(Self::X2),
            4 => Some(Self::X4),
            _ => None,
        }
    }

    /// Model to use for a requested scale: 4x from 3.0 up, otherwise 2x.
    pub fn for_scale(scale: f64) -> Self {
        if scale >= 3.0 {
            Self::X4
        } else {
            Self::X2
        }
    }
}

/// Processing parameters handed to a capability before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingHints {
    /// Tile edge in input pixels; 0 processes whole frames.
    pub tile_size: u32,
    pub batch_size: u32,
    pub reduced_precision: bool,
}

impl Default for ProcessingHints {
    fn default() -> Self {
        Self {
            tile_size: 0,
            batch_size: 1,
            reduced_precision: false,
        }
    }
}

/// `w*h / 2^20`, the megapixel unit used by memory estimates.
fn mebipixels(resolution: Resolution) -> f64 {
    resolution.pixels() as f64 / (1u64 << 20) as f64
}

/// Estimated device memory in GB for enhancing one frame.
pub fn enhancer_memory_gb(input: Resolution, ratio: NativeRatio, reduced_precision: bool) -> f64 {
    let per_mp = if reduced_precision { 0.5 } else { 1.0 };
    let r = ratio.factor() as f64;
    2.0 + mebipixels(input) * per_mp * r * r
}

/// Estimated device memory in GB for interpolating one frame pair.
pub fn interpolator_memory_gb(input: Resolution, reduced_precision: bool) -> f64 {
    let per_mp = if reduced_precision { 0.3 } else { 0.5 };
    1.0 + mebipixels(input) * per_mp
}

/// A fixed-ratio super-resolution transform.
pub trait FrameEnhancer: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Magnification applied by [`enhance`](Self::enhance) without `outscale`.
    fn native_ratio(&self) -> NativeRatio;

    /// Enhance one frame.
    ///
    /// With `outscale`, the result is resampled to `round(dim * outscale)`
    /// instead of the native ratio.
    fn enhance(&mut self, frame: &Frame, outscale: Option<f32>) -> AiResult<Frame>;

    /// Device memory needed for one frame at `input` resolution.
    fn estimate_memory_gb(&self, input: Resolution) -> f64;

    /// Release cached buffers. Called periodically during long runs.
    fn reclaim(&mut self) {}

    /// Apply per-run processing parameters.
    fn configure(&mut self, _hints: &ProcessingHints) {}
}

/// Evenly spaced timesteps strictly inside (0, 1): `(j+1)/(count+1)`.
pub fn timesteps(count: usize) -> Vec<f32> {
    (0..count)
        .map(|j| (j + 1) as f32 / (count + 1) as f32)
        .collect()
}

/// Reject frame pairs that cannot be interpolated.
pub fn check_pair(a: &Frame, b: &Frame) -> AiResult<()> {
    if a.resolution() != b.resolution() {
        return Err(AiError::PreprocessError(format!(
            "Frame size mismatch: {} vs {}",
            a.resolution(),
            b.resolution()
        )));
    }
    Ok(())
}

fn check_timestep(t: f32) -> AiResult<()> {
    if !(0.0..=1.0).contains(&t) {
        return Err(AiError::PreprocessError(format!(
            "Timestep {t} outside [0, 1]"
        )));
    }
    Ok(())
}

/// Synthesizes in-between frames.
pub trait FrameInterpolator: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// One frame at position `t` between `a` (t = 0) and `b` (t = 1).
    fn interpolate_at(&mut self, a: &Frame, b: &Frame, t: f32) -> AiResult<Frame>;

    /// `count` frames at [`timesteps`], or a single frame at `timestep`.
    fn interpolate(
        &mut self,
        a: &Frame,
        b: &Frame,
        count: usize,
        timestep: Option<f32>,
    ) -> AiResult<Vec<Frame>> {
        check_pair(a, b)?;
        match timestep {
            Some(t) => {
                check_timestep(t)?;
                Ok(vec![self.interpolate_at(a, b, t)?])
            }
            None => timesteps(count)
                .into_iter()
                .map(|t| self.interpolate_at(a, b, t))
                .collect(),
        }
    }

    /// Device memory needed for one pair at `input` resolution.
    fn estimate_memory_gb(&self, input: Resolution) -> f64 {
        interpolator_memory_gb(input, false)
    }

    /// Release cached buffers.
    fn reclaim(&mut self) {}
}
