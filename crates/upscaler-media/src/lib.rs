//! Video Upscaler Media - FFmpeg integration for video I/O
//!
//! This crate handles:
//! - Media file probing (ffprobe)
//! - Frame-accurate decoding to RGB24
//! - Encoding processed frames
//! - Re-muxing the original audio track, with a video-only fallback

pub mod backend;
pub mod decoder;
pub mod encoder;
pub mod mux;
pub mod probe;

pub use backend::{FfmpegBackend, FrameIter, FrameSink, FrameSource, MediaBackend, SinkSpec};
pub use decoder::{FrameStream, VideoSource};
pub use encoder::{EncoderSettings, VideoSink};
pub use mux::{mux_audio_or_fallback, AudioMuxer, MuxOutcome};
pub use probe::MediaProbe;
