//! Seams between the pipeline and concrete media I/O.
//!
//! The orchestrator only talks to these traits. [`FfmpegBackend`] is the
//! production implementation; tests plug in in-memory ones.

use crate::decoder::VideoSource;
use crate::encoder::{EncoderSettings, VideoSink};
use crate::mux::AudioMuxer;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;
use upscaler_core::{Frame, FrameRate, Resolution, Result, UpscalerError, VideoMetadata};

/// Lazy sequence of `(index, frame)` pairs in index order.
pub type FrameIter<'a> = Box<dyn Iterator<Item = Result<(u64, Frame)>> + 'a>;

/// A readable video.
pub trait FrameSource: Send {
    /// Metadata read when the source was opened.
    fn metadata(&self) -> &VideoMetadata;

    /// Location of the container.
    fn path(&self) -> &Path;

    /// Whether the container carries an audio stream.
    fn has_audio(&self) -> bool;

    /// Decode frames `range.start..range.end`, clamped to the frame count.
    ///
    /// Each call starts a fresh decode; the returned iterator is not
    /// restartable.
    fn frames(&mut self, range: Range<u64>) -> Result<FrameIter<'_>>;
}

/// Where and how a sink writes its output.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub frame_rate: FrameRate,
    pub resolution: Resolution,
    /// Container whose audio is muxed into the result, if any.
    pub audio_source: Option<PathBuf>,
}

/// A writable video at a fixed resolution and frame rate.
pub trait FrameSink: Send {
    /// Output resolution; frames of any other size are resampled to it.
    fn resolution(&self) -> Resolution;

    /// Append one frame.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Frames written so far.
    fn frames_written(&self) -> u64;

    /// Finalize the container (and mux audio) and return the output path.
    fn finish(self: Box<Self>) -> Result<PathBuf>;
}

/// Factory for sources and sinks.
pub trait MediaBackend: Send + Sync {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>>;

    fn open_sink(&self, spec: SinkSpec) -> Result<Box<dyn FrameSink>>;

    /// Copy `input` to `output` unchanged (no-op interpolation).
    fn copy_passthrough(&self, input: &Path, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::copy(input, output).map_err(|e| {
            UpscalerError::Encoder(format!(
                "Failed to copy {} to {}: {e}",
                input.display(),
                output.display()
            ))
        })?;
        Ok(())
    }
}

/// FFmpeg-backed media I/O.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    pub encoder: EncoderSettings,
    pub muxer: AudioMuxer,
}

impl FfmpegBackend {
    pub fn new(encoder: EncoderSettings) -> Self {
        Self {
            encoder,
            muxer: AudioMuxer::default(),
        }
    }

    /// Whether the ffmpeg binary can be found.
    pub fn is_available() -> bool {
        ffmpeg_sidecar::command::ffmpeg_is_installed()
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(VideoSource::open(path)?))
    }

    fn open_sink(&self, spec: SinkSpec) -> Result<Box<dyn FrameSink>> {
        info!(
            path = %spec.path.display(),
            resolution = %spec.resolution,
            fps = spec.frame_rate.to_fps_f64(),
            "Opening video sink"
        );
        Ok(Box::new(VideoSink::open(
            spec,
            self.encoder.clone(),
            self.muxer.clone(),
        )?))
    }
}
