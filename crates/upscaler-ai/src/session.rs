//! ONNX Runtime session wrapper and tensor conversion.
//!
//! Gated behind the `onnx` feature flag.

use crate::error::{AiError, AiResult};
use crate::model_manager::ModelId;
use ndarray::{Array4, ArrayD, ArrayViewD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::info;
use upscaler_core::frame::CHANNELS;
use upscaler_core::Frame;

/// A loaded ONNX model session.
pub struct OnnxSession {
    session: Session,
    model_id: ModelId,
}

impl OnnxSession {
    /// Load an ONNX model from a file path.
    pub fn load(model_path: &Path, model_id: ModelId) -> AiResult<Self> {
        if !model_path.exists() {
            return Err(AiError::ModelNotFound {
                model_id: model_id.key().to_string(),
                path: model_path.display().to_string(),
            });
        }

        info!(model = ?model_id, path = %model_path.display(), "Loading ONNX session");

        let session = Session::builder()
            .map_err(AiError::onnx)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(AiError::onnx)?
            .commit_from_file(model_path)
            .map_err(AiError::onnx)?;

        info!(model = ?model_id, "ONNX session loaded successfully");
        Ok(Self { session, model_id })
    }

    /// Run a model with one positional input and return its first output.
    pub fn run_single(&mut self, input: ArrayD<f32>) -> AiResult<ArrayD<f32>> {
        let tensor = Tensor::from_array(input).map_err(AiError::onnx)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(AiError::onnx)?;
        let view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(AiError::onnx)?;
        Ok(view.to_owned())
    }

    /// Run a frame-interpolation model with named inputs.
    pub fn run_interpolation(
        &mut self,
        img0: ArrayD<f32>,
        img1: ArrayD<f32>,
        timestep: ArrayD<f32>,
    ) -> AiResult<ArrayD<f32>> {
        let img0 = Tensor::from_array(img0).map_err(AiError::onnx)?;
        let img1 = Tensor::from_array(img1).map_err(AiError::onnx)?;
        let timestep = Tensor::from_array(timestep).map_err(AiError::onnx)?;
        let outputs = self
            .session
            .run(ort::inputs![
                "img0" => img0,
                "img1" => img1,
                "timestep" => timestep,
            ])
            .map_err(AiError::onnx)?;
        let view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(AiError::onnx)?;
        Ok(view.to_owned())
    }

    /// Get the model ID this session was loaded for.
    pub fn model_id(&self) -> ModelId {
        self.model_id
    }
}

/// Convert an RGB24 frame to an NCHW f32 tensor in `[0, 1]`.
///
/// Output shape: `[1, 3, height, width]`.
pub fn frame_to_nchw(frame: &Frame) -> ArrayD<f32> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let mut arr = Array4::<f32>::zeros((1, 3, h, w));

    for y in 0..h {
        let row = frame.row(y as u32);
        for x in 0..w {
            let base = x * CHANNELS;
            for c in 0..CHANNELS {
                arr[[0, c, y, x]] = row[base + c] as f32 / 255.0;
            }
        }
    }

    arr.into_dyn()
}

/// Convert an NCHW f32 tensor back to an RGB24 frame.
pub fn nchw_to_frame(tensor: ArrayViewD<'_, f32>, width: u32, height: u32) -> AiResult<Frame> {
    let shape = tensor.shape();
    if shape.len() != 4 || shape[1] < 3 || shape[2] < height as usize || shape[3] < width as usize
    {
        return Err(AiError::Inference(format!(
            "Tensor shape {:?} cannot hold a {}x{} frame",
            shape, width, height
        )));
    }

    let mut frame = Frame::new(width, height);
    for y in 0..height as usize {
        let row = frame.row_mut(y as u32);
        for x in 0..width as usize {
            let base = x * CHANNELS;
            for c in 0..CHANNELS {
                row[base + c] = (tensor[[0, c, y, x]].clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
    }

    Ok(frame)
}
