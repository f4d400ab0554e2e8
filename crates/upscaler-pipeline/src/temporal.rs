//! Frame-rate expansion by an integer multiplier.

use tracing::debug;
use upscaler_ai::{timesteps, FrameInterpolator};
use upscaler_core::{Frame, Result, UpscalerError};

/// Inserts `multiplier - 1` synthesized frames between each consecutive pair.
///
/// For `n >= 1` input frames the output holds `(n - 1) * multiplier + 1`
/// frames: every original frame once, in order, with the interpolated frames
/// of each pair directly after its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalExpander {
    multiplier: u32,
}

impl TemporalExpander {
    /// `multiplier` must be at least 1.
    pub fn new(multiplier: u32) -> Result<Self> {
        if multiplier == 0 {
            return Err(UpscalerError::InvalidMultiplier(multiplier));
        }
        Ok(Self { multiplier })
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Whether expansion leaves the sequence untouched.
    pub fn is_passthrough(&self) -> bool {
        self.multiplier == 1
    }

    /// Frames synthesized per pair.
    pub fn intermediates(&self) -> usize {
        self.multiplier as usize - 1
    }

    /// Positions of the synthesized frames: `(j+1)/multiplier`.
    pub fn timesteps(&self) -> Vec<f32> {
        timesteps(self.intermediates())
    }

    /// Output length for `input_len` source frames.
    pub fn output_len(&self, input_len: u64) -> u64 {
        if input_len == 0 {
            0
        } else {
            (input_len - 1) * self.multiplier as u64 + 1
        }
    }

    /// Frames to place between `a` and `b`, excluding both endpoints.
    pub fn expand_pair(
        &self,
        a: &Frame,
        b: &Frame,
        interpolator: &mut dyn FrameInterpolator,
    ) -> Result<Vec<Frame>> {
        let expected = self.intermediates();
        if expected == 0 {
            return Ok(Vec::new());
        }
        let frames = interpolator.interpolate(a, b, expected, None)?;
        if frames.len() != expected {
            return Err(UpscalerError::Capability(format!(
                "Interpolator '{}' returned {} frames, expected {}",
                interpolator.name(),
                frames.len(),
                expected
            )));
        }
        Ok(frames)
    }

    /// Expand a whole sequence in memory.
    ///
    /// With a multiplier of 1 the input is returned as-is and the
    /// interpolator is never called.
    pub fn expand(
        &self,
        frames: Vec<Frame>,
        interpolator: &mut dyn FrameInterpolator,
    ) -> Result<Vec<Frame>> {
        if self.is_passthrough() || frames.len() < 2 {
            return Ok(frames);
        }

        let mut out = Vec::with_capacity(self.output_len(frames.len() as u64) as usize);
        let mut iter = frames.into_iter();
        let Some(mut current) = iter.next() else {
            return Ok(out);
        };
        for next in iter {
            let between = self.expand_pair(&current, &next, interpolator)?;
            out.push(current);
            out.extend(between);
            current = next;
        }
        out.push(current);

        debug!(
            multiplier = self.multiplier,
            frames = out.len(),
            "Expanded sequence"
        );
        Ok(out)
    }
}
