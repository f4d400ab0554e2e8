//! Video decoding using FFmpeg via ffmpeg-sidecar.
//!
//! FFmpeg runs as a subprocess emitting raw RGB24 on stdout, so no FFmpeg
//! development headers are needed. Every call to [`VideoSource::frames`]
//! starts a new process positioned at the requested range.

use crate::backend::{FrameIter, FrameSource};
use crate::probe::MediaProbe;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use upscaler_core::{Frame, Result, UpscalerError, VideoMetadata};

/// An opened video container.
pub struct VideoSource {
    path: PathBuf,
    metadata: VideoMetadata,
    has_audio: bool,
}

impl VideoSource {
    /// Open a video file and read its metadata.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let probe = MediaProbe::probe(path)?;
        let metadata = probe.metadata()?;

        info!(
            path = %path.display(),
            resolution = %metadata.resolution(),
            fps = metadata.fps(),
            frames = metadata.frame_count,
            "Opened video file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            has_audio: probe.has_audio(),
        })
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the video metadata.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Whether the container has an audio stream.
    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    /// Start decoding `range`, clamped to the frame count.
    pub fn stream(&self, range: Range<u64>) -> Result<FrameStream> {
        let end = range.end.min(self.metadata.frame_count);
        let start = range.start.min(end);
        FrameStream::spawn(&self.path, start, end)
    }

    /// Decode a single frame.
    pub fn read_frame(&self, index: u64) -> Result<Frame> {
        if index >= self.metadata.frame_count {
            return Err(UpscalerError::InvalidParameter(format!(
                "Frame {} out of range (0-{})",
                index,
                self.metadata.frame_count.saturating_sub(1)
            )));
        }

        match self.stream(index..index + 1)?.next() {
            Some(Ok((_, frame))) => Ok(frame),
            Some(Err(e)) => Err(e),
            None => Err(UpscalerError::Decoder(format!(
                "Frame {} could not be decoded",
                index
            ))),
        }
    }
}

impl FrameSource for VideoSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn has_audio(&self) -> bool {
        self.has_audio
    }

    fn frames(&mut self, range: Range<u64>) -> Result<FrameIter<'_>> {
        Ok(Box::new(self.stream(range)?))
    }
}

/// FFmpeg arguments selecting `count` frames starting at `start`.
pub fn decode_args(start: u64, count: u64) -> Vec<String> {
    let mut args = Vec::new();
    if start > 0 {
        args.extend_from_slice(&[
            "-vf".into(),
            format!("select=between(n\\,{}\\,{})", start, start + count.saturating_sub(1)),
            "-vsync".into(),
            "0".into(),
        ]);
    }
    args.extend_from_slice(&["-an".into(), "-frames:v".into(), count.to_string()]);
    args
}

/// A running decode over a frame range.
///
/// Dropping the stream kills and reaps the FFmpeg process.
pub struct FrameStream {
    child: FfmpegChild,
    events: FfmpegIterator,
    next_index: u64,
    end: u64,
    done: bool,
}

impl FrameStream {
    fn spawn(path: &Path, start: u64, end: u64) -> Result<Self> {
        let count = end - start;
        debug!(start, end, "Starting decode");

        let mut child = FfmpegCommand::new()
            .hide_banner()
            .input(path)
            .args(decode_args(start, count))
            .rawvideo()
            .spawn()
            .map_err(|e| UpscalerError::Decoder(format!("Failed to spawn ffmpeg: {e}")))?;

        let events = child
            .iter()
            .map_err(|e| UpscalerError::Decoder(format!("Failed to read ffmpeg output: {e}")))?;

        Ok(Self {
            child,
            events,
            next_index: start,
            end,
            done: count == 0,
        })
    }
}

impl Iterator for FrameStream {
    type Item = Result<(u64, Frame)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        for event in self.events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(out) => {
                    let index = self.next_index;
                    self.next_index += 1;
                    if self.next_index >= self.end {
                        self.done = true;
                    }
                    return Some(
                        Frame::from_rgb24(out.width, out.height, out.data).map(|f| (index, f)),
                    );
                }
                FfmpegEvent::Log(LogLevel::Fatal, msg) => {
                    self.done = true;
                    return Some(Err(UpscalerError::Decoder(msg)));
                }
                FfmpegEvent::Log(LogLevel::Error, msg) | FfmpegEvent::Error(msg) => {
                    warn!(error = %msg, "ffmpeg reported an error while decoding");
                }
                _ => {}
            }
        }

        // Container frame counts are estimates; a short stream simply ends.
        if self.next_index < self.end {
            debug!(
                expected = self.end,
                decoded = self.next_index,
                "Decoder ended before the requested range"
            );
        }
        self.done = true;
        None
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
