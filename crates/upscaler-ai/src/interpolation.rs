//! Frame interpolators.
//!
//! Three implementations share the [`FrameInterpolator`] contract: a RIFE
//! model (`onnx` feature), bidirectional optical flow, and a plain linear
//! blend. They differ only in image quality.

use crate::capability::{check_pair, interpolator_memory_gb, timesteps, FrameInterpolator};
use crate::error::AiResult;
use crate::model_manager::{ModelId, ModelStore};
use crate::optical_flow::{FlowField, FlowParams};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use upscaler_core::{Frame, Resolution};

/// Which interpolator to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolatorKind {
    /// RIFE model, falling back to optical flow when unavailable.
    #[default]
    Rife,
    Flow,
    Blend,
}

/// `(1 - t) * a + t * b`, per channel.
pub fn blend_frames(a: &Frame, b: &Frame, t: f32) -> Frame {
    let mut out = Frame::new(a.width(), a.height());
    for ((o, &pa), &pb) in out.data_mut().iter_mut().zip(a.data()).zip(b.data()) {
        *o = (pa as f32 * (1.0 - t) + pb as f32 * t).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Linear cross-fade between the two frames.
#[derive(Debug, Default)]
pub struct BlendInterpolator;

impl FrameInterpolator for BlendInterpolator {
    fn name(&self) -> &str {
        "blend"
    }

    fn interpolate_at(&mut self, a: &Frame, b: &Frame, t: f32) -> AiResult<Frame> {
        check_pair(a, b)?;
        Ok(blend_frames(a, b, t))
    }

    fn estimate_memory_gb(&self, _input: Resolution) -> f64 {
        0.0
    }
}

/// Optical-flow interpolation (Twixtor-style).
///
/// Flow is computed in both directions once per pair; each timestep warps
/// both frames toward `t` and cross-fades them.
#[derive(Debug, Default)]
pub struct FlowInterpolator {
    params: FlowParams,
}

impl FlowInterpolator {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    fn synthesize(a: &Frame, b: &Frame, ab: &FlowField, ba: &FlowField, t: f32) -> Frame {
        // Shortcut for endpoints
        if t < 0.001 {
            return a.clone();
        }
        if t > 0.999 {
            return b.clone();
        }
        let warped_a = ab.warp_frame(a, t);
        let warped_b = ba.warp_frame(b, 1.0 - t);
        blend_frames(&warped_a, &warped_b, t)
    }
}

impl FrameInterpolator for FlowInterpolator {
    fn name(&self) -> &str {
        "optical-flow"
    }

    fn interpolate_at(&mut self, a: &Frame, b: &Frame, t: f32) -> AiResult<Frame> {
        check_pair(a, b)?;
        let ab = FlowField::compute(a, b, &self.params);
        let ba = FlowField::compute(b, a, &self.params);
        Ok(Self::synthesize(a, b, &ab, &ba, t))
    }

    fn interpolate(
        &mut self,
        a: &Frame,
        b: &Frame,
        count: usize,
        timestep: Option<f32>,
    ) -> AiResult<Vec<Frame>> {
        check_pair(a, b)?;
        let ts = match timestep {
            Some(t) => {
                if !(0.0..=1.0).contains(&t) {
                    return Err(crate::error::AiError::PreprocessError(format!(
                        "Timestep {t} outside [0, 1]"
                    )));
                }
                vec![t]
            }
            None => timesteps(count),
        };
        if ts.is_empty() {
            return Ok(Vec::new());
        }

        let ab = FlowField::compute(a, b, &self.params);
        let ba = FlowField::compute(b, a, &self.params);
        Ok(ts
            .into_iter()
            .map(|t| Self::synthesize(a, b, &ab, &ba, t))
            .collect())
    }

    fn estimate_memory_gb(&self, input: Resolution) -> f64 {
        interpolator_memory_gb(input, false)
    }
}

/// RIFE frame interpolation model wrapper.
#[cfg(feature = "onnx")]
pub struct RifeInterpolator {
    session: crate::session::OnnxSession,
}

#[cfg(feature = "onnx")]
impl RifeInterpolator {
    /// Load a RIFE model from an ONNX file.
    pub fn load(model_path: &std::path::Path) -> AiResult<Self> {
        let session = crate::session::OnnxSession::load(model_path, ModelId::RifeV4)?;
        Ok(Self { session })
    }
}

#[cfg(feature = "onnx")]
impl FrameInterpolator for RifeInterpolator {
    fn name(&self) -> &str {
        "rife"
    }

    fn interpolate_at(&mut self, a: &Frame, b: &Frame, t: f32) -> AiResult<Frame> {
        use crate::error::AiError;
        use crate::session::{frame_to_nchw, nchw_to_frame};

        check_pair(a, b)?;
        let timestep = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[1, 1, 1, 1]), vec![t])
            .map_err(|e| AiError::PreprocessError(e.to_string()))?;
        let output = self
            .session
            .run_interpolation(frame_to_nchw(a), frame_to_nchw(b), timestep)?;
        nchw_to_frame(output.view(), a.width(), a.height())
    }
}

/// Build an interpolator of the requested kind.
///
/// A RIFE request falls back to optical flow when the model is missing,
/// fails to load, or the build has no ONNX support.
pub fn create_interpolator(
    kind: InterpolatorKind,
    store: &ModelStore,
) -> Box<dyn FrameInterpolator> {
    match kind {
        InterpolatorKind::Blend => Box::new(BlendInterpolator),
        InterpolatorKind::Flow => Box::new(FlowInterpolator::default()),
        InterpolatorKind::Rife => match load_rife(store) {
            Ok(rife) => {
                info!("Using RIFE interpolator");
                rife
            }
            Err(reason) => {
                warn!(%reason, "RIFE unavailable, falling back to optical flow");
                Box::new(FlowInterpolator::default())
            }
        },
    }
}

#[cfg(feature = "onnx")]
fn load_rife(store: &ModelStore) -> Result<Box<dyn FrameInterpolator>, String> {
    let path = store.ensure_model(ModelId::RifeV4).map_err(|e| e.to_string())?;
    let rife = RifeInterpolator::load(&path).map_err(|e| e.to_string())?;
    Ok(Box::new(rife))
}

#[cfg(not(feature = "onnx"))]
fn load_rife(store: &ModelStore) -> Result<Box<dyn FrameInterpolator>, String> {
    Err(format!(
        "built without ONNX support ({} in {})",
        ModelId::RifeV4.key(),
        store.model_dir().display()
    ))
}
