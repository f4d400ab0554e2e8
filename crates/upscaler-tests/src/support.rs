//! In-memory media and scripted capabilities shared by the scenarios.
//!
//! Source frame `i` is solid `[0, i % 256, 200]`, so the green channel of
//! any written pixel identifies where it came from. Interpolated frames
//! carry red 255 and `round(t * 100)` in blue.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use upscaler_ai::{
    enhancer_memory_gb, AiError, AiResult, FrameEnhancer, FrameInterpolator, NativeRatio,
    ProcessingHints,
};
use upscaler_core::{Frame, FrameRate, Resolution, Result, UpscalerError, VideoMetadata};
use upscaler_media::{FrameIter, FrameSink, FrameSource, MediaBackend, SinkSpec};
use upscaler_pipeline::{DeviceInfo, Orchestrator, PipelineConfig, ResourcePlanner};

pub const SOURCE_BLUE: u8 = 200;

pub fn source_frame(width: u32, height: u32, index: u64) -> Frame {
    Frame::solid(width, height, [0, (index % 256) as u8, SOURCE_BLUE])
}

/// Red channel marks a synthesized frame.
pub fn is_interpolated(marker: [u8; 3]) -> bool {
    marker[0] == 255
}

// ── Media backend ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SourceEntry {
    metadata: VideoMetadata,
    has_audio: bool,
    fail_at: Option<u64>,
}

/// What one opened sink received.
#[derive(Debug, Clone)]
pub struct SinkRecord {
    pub spec: SinkSpec,
    /// Top-left pixel of every written frame, in write order.
    pub markers: Vec<[u8; 3]>,
    /// Frames that arrived at a size other than the declared one.
    pub resampled: u64,
    pub finished: bool,
}

impl SinkRecord {
    pub fn frames(&self) -> u64 {
        self.markers.len() as u64
    }
}

/// Sources registered by path; sinks recorded instead of encoded.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    sources: Arc<Mutex<HashMap<PathBuf, SourceEntry>>>,
    sinks: Arc<Mutex<Vec<SinkRecord>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, path: impl Into<PathBuf>, metadata: VideoMetadata, has_audio: bool) {
        self.sources.lock().insert(
            path.into(),
            SourceEntry {
                metadata,
                has_audio,
                fail_at: None,
            },
        );
    }

    /// Register a source whose decoder errors on frame `fail_at`.
    pub fn add_failing_source(
        &self,
        path: impl Into<PathBuf>,
        metadata: VideoMetadata,
        fail_at: u64,
    ) {
        self.sources.lock().insert(
            path.into(),
            SourceEntry {
                metadata,
                has_audio: false,
                fail_at: Some(fail_at),
            },
        );
    }

    pub fn sinks(&self) -> Vec<SinkRecord> {
        self.sinks.lock().clone()
    }

    pub fn only_sink(&self) -> SinkRecord {
        let sinks = self.sinks();
        assert_eq!(sinks.len(), 1, "expected exactly one sink");
        sinks.into_iter().next().unwrap()
    }
}

impl MediaBackend for MemoryBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let entry = self
            .sources
            .lock()
            .get(path)
            .copied()
            .ok_or_else(|| UpscalerError::NotFound(path.display().to_string()))?;
        Ok(Box::new(MemorySource {
            path: path.to_path_buf(),
            entry,
        }))
    }

    fn open_sink(&self, spec: SinkSpec) -> Result<Box<dyn FrameSink>> {
        let mut sinks = self.sinks.lock();
        sinks.push(SinkRecord {
            spec: spec.clone(),
            markers: Vec::new(),
            resampled: 0,
            finished: false,
        });
        Ok(Box::new(MemorySink {
            index: sinks.len() - 1,
            resolution: spec.resolution,
            path: spec.path,
            records: Arc::clone(&self.sinks),
        }))
    }
}

struct MemorySource {
    path: PathBuf,
    entry: SourceEntry,
}

impl FrameSource for MemorySource {
    fn metadata(&self) -> &VideoMetadata {
        &self.entry.metadata
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn has_audio(&self) -> bool {
        self.entry.has_audio
    }

    fn frames(&mut self, range: Range<u64>) -> Result<FrameIter<'_>> {
        let SourceEntry {
            metadata, fail_at, ..
        } = self.entry;
        let count = metadata.frame_count;
        let frames = (range.start.min(count)..range.end.min(count)).map(move |i| {
            if fail_at == Some(i) {
                return Err(UpscalerError::Decoder(format!("corrupt frame {i}")));
            }
            Ok((i, source_frame(metadata.width, metadata.height, i)))
        });
        Ok(Box::new(frames))
    }
}

struct MemorySink {
    index: usize,
    resolution: Resolution,
    path: PathBuf,
    records: Arc<Mutex<Vec<SinkRecord>>>,
}

impl FrameSink for MemorySink {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let mut records = self.records.lock();
        let record = &mut records[self.index];
        if frame.resolution() != self.resolution {
            record.resampled += 1;
            let fitted = frame.resize(self.resolution.width, self.resolution.height);
            record.markers.push(fitted.pixel(0, 0));
        } else {
            record.markers.push(frame.pixel(0, 0));
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.records.lock()[self.index].frames()
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        self.records.lock()[self.index].finished = true;
        Ok(self.path)
    }
}

// ── Scripted capabilities ──────────────────────────────────────

/// Enhancer that multiplies dimensions without touching pixel data
/// beyond carrying the input's top-left pixel.
#[derive(Debug)]
pub struct ScriptedEnhancer {
    ratio: NativeRatio,
    pub calls: u64,
    pub reclaims: u64,
    pub hints: Option<ProcessingHints>,
    fail_on_call: Option<u64>,
}

impl ScriptedEnhancer {
    pub fn new(ratio: NativeRatio) -> Self {
        Self {
            ratio,
            calls: 0,
            reclaims: 0,
            hints: None,
            fail_on_call: None,
        }
    }

    /// Fail the `call`-th enhance (1-based).
    pub fn failing_on(mut self, call: u64) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

impl FrameEnhancer for ScriptedEnhancer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn native_ratio(&self) -> NativeRatio {
        self.ratio
    }

    fn enhance(&mut self, frame: &Frame, _outscale: Option<f32>) -> AiResult<Frame> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(AiError::Inference("scripted failure".into()));
        }
        let r = self.ratio.factor();
        let mut out = Frame::new(frame.width() * r, frame.height() * r);
        out.data_mut()[..3].copy_from_slice(&frame.pixel(0, 0));
        Ok(out)
    }

    fn estimate_memory_gb(&self, input: Resolution) -> f64 {
        enhancer_memory_gb(input, self.ratio, false)
    }

    fn reclaim(&mut self) {
        self.reclaims += 1;
    }

    fn configure(&mut self, hints: &ProcessingHints) {
        self.hints = Some(*hints);
    }
}

/// Interpolator whose output records the timestep it was asked for.
#[derive(Debug, Default)]
pub struct MarkerInterpolator {
    pub calls: u64,
    pub reclaims: u64,
}

impl FrameInterpolator for MarkerInterpolator {
    fn name(&self) -> &str {
        "marker"
    }

    fn interpolate_at(&mut self, a: &Frame, _b: &Frame, t: f32) -> AiResult<Frame> {
        self.calls += 1;
        let blue = (t * 100.0).round() as u8;
        Ok(Frame::solid(a.width(), a.height(), [255, 0, blue]))
    }

    fn reclaim(&mut self) {
        self.reclaims += 1;
    }
}

// ── Orchestrator setup ─────────────────────────────────────────

pub fn clip(width: u32, height: u32, frames: u64) -> VideoMetadata {
    VideoMetadata::new(width, height, FrameRate::FPS_30, frames)
}

pub fn cpu_planner() -> ResourcePlanner {
    ResourcePlanner::from_device(DeviceInfo::cpu(8, 16.0))
}

pub fn orchestrator(backend: &MemoryBackend) -> Orchestrator<MemoryBackend> {
    Orchestrator::new(backend.clone(), cpu_planner(), PipelineConfig::default())
}

/// Collects every progress callback.
#[derive(Debug, Default)]
pub struct ProgressLog {
    pub calls: Vec<(u64, u64, f64)>,
}

impl ProgressLog {
    pub fn done_counts(&self) -> Vec<u64> {
        self.calls.iter().map(|(done, _, _)| *done).collect()
    }
}
