//! Tile-based frame enhancement.
//!
//! Frames are split into overlapping tiles, each tile is magnified on its
//! own, and tiles are blended back with feathered weights so seams do not
//! show. The CPU enhancer upsamples tiles bilinearly; with the `onnx`
//! feature a Real-ESRGAN model processes the same tiles.

use crate::capability::{enhancer_memory_gb, FrameEnhancer, NativeRatio, ProcessingHints};
#[cfg(feature = "onnx")]
use crate::error::AiError;
use crate::error::AiResult;
use crate::model_manager::{ModelId, ModelStore};
use rayon::prelude::*;
#[cfg(not(feature = "onnx"))]
use tracing::debug;
#[cfg(feature = "onnx")]
use tracing::{info, warn};
use upscaler_core::frame::CHANNELS;
use upscaler_core::resolution::scale_dimension;
use upscaler_core::{Frame, Resolution};

/// Default overlap between adjacent tiles, in input pixels.
pub const DEFAULT_TILE_OVERLAP: u32 = 32;

/// A rectangle of the input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    fn scaled(self, ratio: u32) -> Self {
        Self {
            x: self.x * ratio,
            y: self.y * ratio,
            width: self.width * ratio,
            height: self.height * ratio,
        }
    }
}

// Start offsets along one axis. The last tile is pulled back so every tile
// has full size when the frame is larger than a tile.
fn tile_origins(len: u32, tile: u32, overlap: u32) -> Vec<u32> {
    if tile == 0 || tile >= len {
        return vec![0];
    }
    let step = tile.saturating_sub(overlap).max(1);
    let mut origins = Vec::new();
    let mut pos = 0u32;
    loop {
        if pos + tile >= len {
            origins.push(len - tile);
            break;
        }
        origins.push(pos);
        pos += step;
    }
    origins.dedup();
    origins
}

/// Split a `width` x `height` frame into overlapping tiles.
///
/// A `tile_size` of 0 yields one tile covering the whole frame.
pub fn tile_grid(width: u32, height: u32, tile_size: u32, overlap: u32) -> Vec<TileRect> {
    let xs = tile_origins(width, tile_size, overlap);
    let ys = tile_origins(height, tile_size, overlap);
    let tw = if tile_size == 0 { width } else { tile_size.min(width) };
    let th = if tile_size == 0 { height } else { tile_size.min(height) };

    let mut tiles = Vec::with_capacity(xs.len() * ys.len());
    for &y in &ys {
        for &x in &xs {
            tiles.push(TileRect {
                x,
                y,
                width: tw,
                height: th,
            });
        }
    }
    tiles
}

/// Copy a tile out of a frame.
pub fn extract_tile(frame: &Frame, rect: TileRect) -> Frame {
    let mut tile = Frame::new(rect.width, rect.height);
    let start = rect.x as usize * CHANNELS;
    let end = start + rect.width as usize * CHANNELS;
    for ty in 0..rect.height {
        let src = &frame.row(rect.y + ty)[start..end];
        tile.row_mut(ty).copy_from_slice(src);
    }
    tile
}

// Ramp from the tile edge inward over `feather` pixels. Edges on the frame
// border keep full weight.
fn edge_weight(pos: u32, len: u32, feather: u32, ramp_start: bool, ramp_end: bool) -> f32 {
    if feather == 0 {
        return 1.0;
    }
    let mut w = 1.0f32;
    if ramp_start && pos < feather {
        w = w.min((pos + 1) as f32 / (feather + 1) as f32);
    }
    if ramp_end && pos + feather >= len {
        w = w.min((len - pos) as f32 / (feather + 1) as f32);
    }
    w
}

/// Weighted accumulation buffers for blending tiles.
#[derive(Debug, Default)]
pub struct BlendCanvas {
    width: u32,
    height: u32,
    accum: Vec<f32>,
    weight: Vec<f32>,
}

impl BlendCanvas {
    /// Prepare for an output of the given size, reusing allocations.
    pub fn reset(&mut self, width: u32, height: u32) {
        let px = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.accum.clear();
        self.accum.resize(px * CHANNELS, 0.0);
        self.weight.clear();
        self.weight.resize(px, 0.0);
    }

    /// Accumulate a magnified tile placed at `rect` (output coordinates).
    pub fn add_tile(&mut self, tile: &Frame, rect: TileRect, feather: u32) {
        let left = rect.x > 0;
        let top = rect.y > 0;
        let right = rect.x + rect.width < self.width;
        let bottom = rect.y + rect.height < self.height;
        let out_w = self.width as usize;

        for ty in 0..rect.height.min(tile.height()) {
            let oy = rect.y + ty;
            if oy >= self.height {
                break;
            }
            let wy = edge_weight(ty, rect.height, feather, top, bottom);
            let row = tile.row(ty);
            for tx in 0..rect.width.min(tile.width()) {
                let ox = rect.x + tx;
                if ox >= self.width {
                    break;
                }
                let w = wy * edge_weight(tx, rect.width, feather, left, right);
                let p = oy as usize * out_w + ox as usize;
                let s = tx as usize * CHANNELS;
                for c in 0..CHANNELS {
                    self.accum[p * CHANNELS + c] += row[s + c] as f32 * w;
                }
                self.weight[p] += w;
            }
        }
    }

    /// Normalize accumulated values into a frame.
    pub fn resolve(&self) -> Frame {
        let mut out = Frame::new(self.width, self.height);
        let data = out.data_mut();
        for (p, &w) in self.weight.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            for c in 0..CHANNELS {
                let v = self.accum[p * CHANNELS + c] / w;
                data[p * CHANNELS + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    /// Free the buffers.
    pub fn release(&mut self) {
        self.accum = Vec::new();
        self.weight = Vec::new();
    }

    /// Bytes currently held.
    pub fn capacity_bytes(&self) -> usize {
        (self.accum.capacity() + self.weight.capacity()) * std::mem::size_of::<f32>()
    }
}

/// Bilinear magnification by an integer ratio (pixel centres aligned).
pub fn bilinear_upscale(frame: &Frame, ratio: u32) -> Frame {
    let (w, h) = (frame.width(), frame.height());
    let out_w = w * ratio;
    let out_h = h * ratio;
    let mut out = Frame::new(out_w, out_h);
    if w == 0 || h == 0 {
        return out;
    }
    let inv = 1.0 / ratio as f32;

    for oy in 0..out_h {
        let sy = ((oy as f32 + 0.5) * inv - 0.5).max(0.0);
        let y0 = (sy.floor() as u32).min(h - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fy = sy - y0 as f32;
        let (r0, r1) = (frame.row(y0), frame.row(y1));
        let dst = out.row_mut(oy);

        for ox in 0..out_w {
            let sx = ((ox as f32 + 0.5) * inv - 0.5).max(0.0);
            let x0 = (sx.floor() as u32).min(w - 1);
            let x1 = (x0 + 1).min(w - 1);
            let fx = sx - x0 as f32;
            let (i0, i1) = (x0 as usize * CHANNELS, x1 as usize * CHANNELS);

            for c in 0..CHANNELS {
                let top = r0[i0 + c] as f32 * (1.0 - fx) + r0[i1 + c] as f32 * fx;
                let bottom = r1[i0 + c] as f32 * (1.0 - fx) + r1[i1 + c] as f32 * fx;
                let v = top * (1.0 - fy) + bottom * fy;
                dst[ox as usize * CHANNELS + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Resample a natively magnified frame to `round(source * outscale)`.
fn apply_outscale(
    enhanced: Frame,
    source: Resolution,
    ratio: NativeRatio,
    outscale: Option<f32>,
) -> Frame {
    match outscale {
        Some(s) if (s as f64 - ratio.factor() as f64).abs() > 1e-3 => {
            let w = scale_dimension(source.width, s as f64);
            let h = scale_dimension(source.height, s as f64);
            enhanced.resize(w, h)
        }
        _ => enhanced,
    }
}

/// CPU enhancer: tiled bilinear magnification.
///
/// Tiles are magnified in parallel on the rayon pool and blended in order.
pub struct TiledUpscaler {
    ratio: NativeRatio,
    tile_size: u32,
    overlap: u32,
    reduced_precision: bool,
    canvas: BlendCanvas,
}

impl TiledUpscaler {
    /// Create an upscaler with whole-frame processing.
    pub fn new(ratio: NativeRatio) -> Self {
        Self {
            ratio,
            tile_size: 0,
            overlap: DEFAULT_TILE_OVERLAP,
            reduced_precision: false,
            canvas: BlendCanvas::default(),
        }
    }

    /// Set the tile size (0 = whole frame).
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Set the tile overlap.
    pub fn with_overlap(mut self, overlap: u32) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Bytes held by scratch buffers.
    pub fn scratch_bytes(&self) -> usize {
        self.canvas.capacity_bytes()
    }
}

impl FrameEnhancer for TiledUpscaler {
    fn name(&self) -> &str {
        "tiled-bilinear"
    }

    fn native_ratio(&self) -> NativeRatio {
        self.ratio
    }

    fn enhance(&mut self, frame: &Frame, outscale: Option<f32>) -> AiResult<Frame> {
        let r = self.ratio.factor();
        let tiles = tile_grid(frame.width(), frame.height(), self.tile_size, self.overlap);

        let enhanced = if tiles.len() == 1 {
            bilinear_upscale(frame, r)
        } else {
            let magnified: Vec<(TileRect, Frame)> = tiles
                .par_iter()
                .map(|&rect| (rect.scaled(r), bilinear_upscale(&extract_tile(frame, rect), r)))
                .collect();

            self.canvas.reset(frame.width() * r, frame.height() * r);
            let feather = (self.overlap / 2) * r;
            for (rect, tile) in &magnified {
                self.canvas.add_tile(tile, *rect, feather);
            }
            self.canvas.resolve()
        };

        Ok(apply_outscale(enhanced, frame.resolution(), self.ratio, outscale))
    }

    fn estimate_memory_gb(&self, input: Resolution) -> f64 {
        enhancer_memory_gb(input, self.ratio, self.reduced_precision)
    }

    fn reclaim(&mut self) {
        self.canvas.release();
    }

    fn configure(&mut self, hints: &ProcessingHints) {
        self.tile_size = hints.tile_size;
        self.reduced_precision = hints.reduced_precision;
    }
}

/// Real-ESRGAN enhancer running through ONNX Runtime.
#[cfg(feature = "onnx")]
pub struct OnnxEnhancer {
    session: crate::session::OnnxSession,
    ratio: NativeRatio,
    tile_size: u32,
    overlap: u32,
    reduced_precision: bool,
    canvas: BlendCanvas,
}

#[cfg(feature = "onnx")]
impl OnnxEnhancer {
    /// Load a Real-ESRGAN model.
    pub fn load(model_path: &std::path::Path, ratio: NativeRatio) -> AiResult<Self> {
        let model = crate::model_manager::ModelId::for_ratio(ratio);
        let session = crate::session::OnnxSession::load(model_path, model)?;
        Ok(Self {
            session,
            ratio,
            tile_size: 0,
            overlap: DEFAULT_TILE_OVERLAP,
            reduced_precision: false,
            canvas: BlendCanvas::default(),
        })
    }

    fn run_tile(&mut self, tile: &Frame) -> AiResult<Frame> {
        let r = self.ratio.factor();
        let input = crate::session::frame_to_nchw(tile);
        let output = self.session.run_single(input)?;
        let shape = output.shape();
        if shape.len() != 4 || shape[2] != (tile.height() * r) as usize {
            return Err(AiError::Inference(format!(
                "Unexpected output shape {:?} for {}x tile {}",
                shape,
                r,
                tile.resolution()
            )));
        }
        crate::session::nchw_to_frame(output.view(), tile.width() * r, tile.height() * r)
    }
}

#[cfg(feature = "onnx")]
impl FrameEnhancer for OnnxEnhancer {
    fn name(&self) -> &str {
        "realesrgan-onnx"
    }

    fn native_ratio(&self) -> NativeRatio {
        self.ratio
    }

    fn enhance(&mut self, frame: &Frame, outscale: Option<f32>) -> AiResult<Frame> {
        let r = self.ratio.factor();
        let tiles = tile_grid(frame.width(), frame.height(), self.tile_size, self.overlap);

        let enhanced = if tiles.len() == 1 {
            self.run_tile(frame)?
        } else {
            let mut canvas = std::mem::take(&mut self.canvas);
            canvas.reset(frame.width() * r, frame.height() * r);
            let feather = (self.overlap / 2) * r;
            for rect in tiles {
                let tile = self.run_tile(&extract_tile(frame, rect))?;
                canvas.add_tile(&tile, rect.scaled(r), feather);
            }
            let out = canvas.resolve();
            self.canvas = canvas;
            out
        };

        Ok(apply_outscale(enhanced, frame.resolution(), self.ratio, outscale))
    }

    fn estimate_memory_gb(&self, input: Resolution) -> f64 {
        enhancer_memory_gb(input, self.ratio, self.reduced_precision)
    }

    fn reclaim(&mut self) {
        self.canvas.release();
    }

    fn configure(&mut self, hints: &ProcessingHints) {
        self.tile_size = hints.tile_size;
        self.reduced_precision = hints.reduced_precision;
    }
}

/// Build the enhancer for `ratio`.
///
/// With ONNX support and a cached Real-ESRGAN model the model is used;
/// otherwise the CPU tiled upscaler.
pub fn create_enhancer(ratio: NativeRatio, store: &ModelStore) -> Box<dyn FrameEnhancer> {
    #[cfg(feature = "onnx")]
    {
        let loaded = store
            .ensure_model(ModelId::for_ratio(ratio))
            .and_then(|path| OnnxEnhancer::load(&path, ratio));
        match loaded {
            Ok(enhancer) => {
                info!(ratio = ratio.factor(), "Using Real-ESRGAN enhancer");
                return Box::new(enhancer);
            }
            Err(e) => warn!(error = %e, "Real-ESRGAN unavailable, using CPU upscaler"),
        }
    }
    #[cfg(not(feature = "onnx"))]
    debug!(
        model = ModelId::for_ratio(ratio).key(),
        dir = %store.model_dir().display(),
        "Built without ONNX support, using CPU upscaler"
    );

    Box::new(TiledUpscaler::new(ratio))
}
