//! Encoding processed frames to a video file.
//!
//! Frames are piped to an FFmpeg process as raw RGB24. When the source has
//! audio, video goes to a `{stem}_temp.{ext}` file first and is muxed with
//! the original audio on [`VideoSink::finish`].

use crate::backend::{FrameSink, SinkSpec};
use crate::mux::{mux_audio_or_fallback, AudioMuxer, MuxOutcome};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, warn};
use upscaler_core::{Frame, FrameRate, Resolution, Result, UpscalerError};

/// Video encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// FFmpeg encoder name.
    pub codec: String,
    /// CRF value for H.264/H.265 (0-51, lower = better).
    pub crf: u32,
    /// Encoder speed preset.
    pub preset: String,
    /// Output pixel format.
    pub pixel_format: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".into(),
            crf: 18,
            preset: "medium".into(),
            pixel_format: "yuv420p".into(),
        }
    }
}

impl EncoderSettings {
    /// Build the FFmpeg command arguments for a raw RGB24 pipe input.
    pub fn ffmpeg_args(
        &self,
        resolution: Resolution,
        frame_rate: FrameRate,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            "rgb24".into(),
            "-video_size".into(),
            resolution.to_string(),
            "-framerate".into(),
            format!("{}/{}", frame_rate.numerator, frame_rate.denominator),
            "-i".into(),
            "pipe:0".into(),
            "-c:v".into(),
            self.codec.clone(),
            "-crf".into(),
            self.crf.to_string(),
            "-preset".into(),
            self.preset.clone(),
        ];

        // 4:2:0 chroma needs even dimensions.
        if resolution.width % 2 == 1 || resolution.height % 2 == 1 {
            debug!(
                requested = %resolution,
                encoded = %padded_resolution(resolution),
                "Padding odd frame size for the encoder"
            );
            args.extend_from_slice(&["-vf".into(), "pad=ceil(iw/2)*2:ceil(ih/2)*2".into()]);
        }

        args.extend_from_slice(&["-pix_fmt".into(), self.pixel_format.clone()]);
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

/// Dimensions after the encoder pads odd sizes up to the next even value.
pub fn padded_resolution(resolution: Resolution) -> Resolution {
    Resolution::new(
        resolution.width + resolution.width % 2,
        resolution.height + resolution.height % 2,
    )
}

/// `{stem}_temp.{ext}` next to `output`.
pub fn temp_video_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let ext = output
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".into());
    output.with_file_name(format!("{stem}_temp.{ext}"))
}

/// An FFmpeg encoding process fed frame by frame.
///
/// Odd target sizes are padded to even dimensions in the encoded file (see
/// [`padded_resolution`]); frames are still written at the sink resolution.
/// Dropping an unfinished sink kills the encoder; the partial file stays.
pub struct VideoSink {
    spec: SinkSpec,
    video_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    muxer: AudioMuxer,
    frames_written: u64,
    warned_resize: bool,
}

impl VideoSink {
    /// Start the encoder for `spec`.
    pub fn open(spec: SinkSpec, settings: EncoderSettings, muxer: AudioMuxer) -> Result<Self> {
        if let Some(parent) = spec.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let video_path = if spec.audio_source.is_some() {
            temp_video_path(&spec.path)
        } else {
            spec.path.clone()
        };

        let args = settings.ffmpeg_args(spec.resolution, spec.frame_rate, &video_path);
        let mut child = Command::new(ffmpeg_sidecar::paths::ffmpeg_path())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| UpscalerError::Encoder(format!("Failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| UpscalerError::Encoder("Failed to open ffmpeg stdin".into()))?;

        debug!(path = %video_path.display(), "Encoder started");

        Ok(Self {
            spec,
            video_path,
            child: Some(child),
            stdin: Some(stdin),
            muxer,
            frames_written: 0,
            warned_resize: false,
        })
    }

    /// The file frames are currently written to.
    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    fn close_encoder(&mut self) -> Result<()> {
        // Dropping stdin signals end-of-stream.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let status = child.wait().map_err(|e| {
                UpscalerError::Encoder(format!("Failed to wait for ffmpeg: {e}"))
            })?;
            if !status.success() {
                return Err(UpscalerError::Encoder(format!(
                    "ffmpeg exited with status: {}",
                    status
                )));
            }
        }
        Ok(())
    }
}

impl FrameSink for VideoSink {
    fn resolution(&self) -> Resolution {
        self.spec.resolution
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| UpscalerError::Encoder("Encoder already closed".into()))?;

        let target = self.spec.resolution;
        let result = if frame.resolution() != target {
            if !self.warned_resize {
                warn!(
                    frame = %frame.resolution(),
                    sink = %target,
                    "Frame size differs from sink, resampling"
                );
                self.warned_resize = true;
            }
            let resized = frame.resize(target.width, target.height);
            stdin.write_all(resized.data())
        } else {
            stdin.write_all(frame.data())
        };

        result.map_err(|e| UpscalerError::Encoder(format!("Failed to write frame: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf> {
        self.close_encoder()?;

        if let Some(audio_source) = self.spec.audio_source.clone() {
            let outcome =
                mux_audio_or_fallback(&self.video_path, &self.spec.path, &audio_source, &self.muxer)?;
            if outcome == MuxOutcome::VideoOnly {
                warn!(output = %self.spec.path.display(), "Delivered video without audio");
            }
        }

        debug!(frames = self.frames_written, "Encoder finished");
        Ok(self.spec.path.clone())
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
