//! Decomposition of an arbitrary scale factor into enhancer passes and a
//! corrective resize.
//!
//! Enhancer passes are expensive and produce the best detail, so a plan uses
//! them wherever the requested magnification calls for one and reaches the
//! exact pixel target with a single Lanczos resize at the end.

use serde::{Deserialize, Serialize};
use tracing::debug;
use upscaler_ai::{FrameEnhancer, NativeRatio};
use upscaler_core::{Frame, Resolution, Result, UpscalerError};

/// Largest accepted scale factor.
pub const MAX_SCALE: f64 = 16.0;

/// Below this factor the enhancer is skipped and frames are only resampled.
pub const RESAMPLE_ONLY_BELOW: f64 = 1.5;

/// `|scale - native|` within which the native ratio is used as-is.
const NATIVE_MATCH_TOLERANCE: f64 = 0.001;

/// Remainder deviation from 1.0 that still warrants a resize after
/// composed enhancer passes.
const REMAINDER_TOLERANCE: f64 = 0.01;

/// One step of a [`ScalePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleStep {
    /// Run the enhancer at its native ratio.
    Enhance { ratio: NativeRatio },
    /// Resample to exact dimensions.
    Resize { width: u32, height: u32 },
}

/// Ordered steps realizing a requested magnification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalePlan {
    steps: Vec<ScaleStep>,
    source: Resolution,
    target: Resolution,
    requested_scale: f64,
}

/// Build the plan for `requested_scale` with an enhancer of `native_ratio`.
///
/// `requested_scale` must lie in `(0, 16]` and `native_ratio` must be 2 or 4.
pub fn plan(requested_scale: f64, native_ratio: u32, source: Resolution) -> Result<ScalePlan> {
    if !requested_scale.is_finite() || requested_scale <= 0.0 || requested_scale > MAX_SCALE {
        return Err(UpscalerError::InvalidScale(requested_scale));
    }
    let ratio = NativeRatio::from_factor(native_ratio)
        .ok_or(UpscalerError::InvalidNativeRatio(native_ratio))?;
    let native = ratio.factor() as f64;
    let exact = source.scaled(requested_scale);

    let steps = if requested_scale < RESAMPLE_ONLY_BELOW {
        vec![ScaleStep::Resize {
            width: exact.width,
            height: exact.height,
        }]
    } else if (requested_scale - native).abs() <= NATIVE_MATCH_TOLERANCE {
        vec![ScaleStep::Enhance { ratio }]
    } else if requested_scale >= 2.0 * native {
        let passes = composed_passes(requested_scale, native);
        let remainder = requested_scale / native.powi(passes as i32);
        let mut steps = vec![ScaleStep::Enhance { ratio }; passes as usize];
        if (remainder - 1.0).abs() > REMAINDER_TOLERANCE {
            steps.push(ScaleStep::Resize {
                width: exact.width,
                height: exact.height,
            });
        }
        steps
    } else {
        vec![
            ScaleStep::Enhance { ratio },
            ScaleStep::Resize {
                width: exact.width,
                height: exact.height,
            },
        ]
    };

    let target = steps.iter().fold(source, |res, step| match *step {
        ScaleStep::Enhance { ratio } => res.times(ratio.factor()),
        ScaleStep::Resize { width, height } => Resolution::new(width, height),
    });

    debug!(
        scale = requested_scale,
        native = native_ratio,
        %source,
        %target,
        steps = steps.len(),
        "Scale plan built"
    );

    Ok(ScalePlan {
        steps,
        source,
        target,
        requested_scale,
    })
}

/// Largest `k` with `native^k <= scale`.
fn composed_passes(scale: f64, native: f64) -> u32 {
    let mut passes = 1;
    let mut magnification = native;
    while magnification * native <= scale + 1e-9 {
        magnification *= native;
        passes += 1;
    }
    passes
}

impl ScalePlan {
    /// Steps in execution order.
    pub fn steps(&self) -> &[ScaleStep] {
        &self.steps
    }

    pub fn source(&self) -> Resolution {
        self.source
    }

    /// Output dimensions after every step has run.
    pub fn target(&self) -> Resolution {
        self.target
    }

    pub fn requested_scale(&self) -> f64 {
        self.requested_scale
    }

    /// Number of enhancer invocations per frame.
    pub fn enhancer_passes(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, ScaleStep::Enhance { .. }))
            .count()
    }

    /// Whether the plan ends in a resample.
    pub fn has_resize(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, ScaleStep::Resize { .. }))
    }

    /// Horizontal magnification actually produced by the plan.
    pub fn composed_ratio(&self) -> f64 {
        self.target.width as f64 / self.source.width.max(1) as f64
    }

    /// Resolution fed into each enhancer pass, in order.
    pub fn enhancer_inputs(&self) -> Vec<Resolution> {
        let mut res = self.source;
        let mut inputs = Vec::new();
        for step in &self.steps {
            match *step {
                ScaleStep::Enhance { ratio } => {
                    inputs.push(res);
                    res = res.times(ratio.factor());
                }
                ScaleStep::Resize { width, height } => res = Resolution::new(width, height),
            }
        }
        inputs
    }

    /// Run every step on `frame`.
    pub fn apply(&self, frame: Frame, enhancer: &mut dyn FrameEnhancer) -> Result<Frame> {
        let mut current = frame;
        for step in &self.steps {
            current = match *step {
                ScaleStep::Enhance { ratio } => {
                    if enhancer.native_ratio() != ratio {
                        return Err(UpscalerError::Capability(format!(
                            "Enhancer '{}' runs at {}x but the plan expects {}x",
                            enhancer.name(),
                            enhancer.native_ratio().factor(),
                            ratio.factor()
                        )));
                    }
                    enhancer.enhance(&current, None)?
                }
                ScaleStep::Resize { width, height } => {
                    if current.width() == width && current.height() == height {
                        current
                    } else {
                        current.resize(width, height)
                    }
                }
            };
        }
        Ok(current)
    }
}
