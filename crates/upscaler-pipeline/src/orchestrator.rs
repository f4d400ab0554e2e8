//! End-to-end run driver.
//!
//! A run moves through `Idle -> Validating -> Planning -> Streaming ->
//! Finalizing` and ends in `Completed` or `Failed`. Frames are decoded,
//! transformed and written strictly in index order on the calling thread.
//! Callers wanting a responsive front-end run the orchestrator on a worker
//! and receive progress through the callback.
//!
//! Every entry point returns a [`ProcessingResult`]; errors never escape.

use crate::config::PipelineConfig;
use crate::naming::{interpolated_output_path, upscaled_output_path};
use crate::progress::{CancelToken, RollingEta};
use crate::resources::ResourcePlanner;
use crate::result::{ProcessingMetrics, ProcessingResult};
use crate::scale_plan::{self, ScalePlan};
use crate::temporal::TemporalExpander;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use upscaler_ai::{FrameEnhancer, FrameInterpolator};
use upscaler_core::{Result, UpscalerError, VideoMetadata};
use upscaler_media::{FrameSink, MediaBackend, SinkSpec};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Validating,
    Planning,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Which source frames a run covers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FrameWindow {
    #[default]
    All,
    /// Explicit index range, clamped to the frame count.
    Range(Range<u64>),
    /// The first N seconds (preview mode).
    Seconds(f64),
}

impl FrameWindow {
    /// Concrete index range for a source.
    pub fn resolve(&self, metadata: &VideoMetadata) -> Range<u64> {
        let count = metadata.frame_count;
        match self {
            Self::All => 0..count,
            Self::Range(r) => r.start.min(count)..r.end.min(count),
            Self::Seconds(secs) => 0..metadata.frames_in(*secs).max(1).min(count),
        }
    }
}

/// How the output frame rate is requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrameRateTarget {
    Multiplier(u32),
    Fps(f64),
}

/// A spatial upscaling request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpscaleJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub scale: f64,
    pub window: FrameWindow,
}

impl UpscaleJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, scale: f64) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            scale,
            window: FrameWindow::All,
        }
    }

    /// Restrict to source frames `range`.
    pub fn with_range(mut self, range: Range<u64>) -> Self {
        self.window = FrameWindow::Range(range);
        self
    }

    /// Restrict to the first `seconds` of the source.
    pub fn with_preview(mut self, seconds: f64) -> Self {
        self.window = FrameWindow::Seconds(seconds);
        self
    }
}

/// A frame-rate interpolation request.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rate: FrameRateTarget,
    pub window: FrameWindow,
}

impl InterpolationJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        rate: FrameRateTarget,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            rate,
            window: FrameWindow::All,
        }
    }

    pub fn with_range(mut self, range: Range<u64>) -> Self {
        self.window = FrameWindow::Range(range);
        self
    }

    pub fn with_preview(mut self, seconds: f64) -> Self {
        self.window = FrameWindow::Seconds(seconds);
        self
    }
}

/// Drives upscaling and interpolation runs against a media backend.
pub struct Orchestrator<B: MediaBackend> {
    backend: B,
    planner: ResourcePlanner,
    config: PipelineConfig,
    cancel: CancelToken,
    state: RunState,
}

impl<B: MediaBackend> Orchestrator<B> {
    pub fn new(backend: B, planner: ResourcePlanner, config: PipelineConfig) -> Self {
        Self {
            backend,
            planner,
            config,
            cancel: CancelToken::new(),
            state: RunState::Idle,
        }
    }

    /// Use an externally owned cancel token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the current run at the next frame boundary.
    /// A cancelled token stays cancelled for later runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn planner(&self) -> &ResourcePlanner {
        &self.planner
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Default output location for a full upscaling run.
    pub fn upscale_output_for(&self, input: &Path, scale: f64) -> PathBuf {
        upscaled_output_path(&self.config.output_dir, input, scale)
    }

    /// Default output location for a full interpolation run.
    pub fn interpolation_output_for(&self, input: &Path, multiplier: u32) -> PathBuf {
        interpolated_output_path(&self.config.output_dir, input, multiplier)
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state");
        self.state = next;
    }

    fn finish_run(
        &mut self,
        what: &str,
        input: &Path,
        outcome: Result<(PathBuf, ProcessingMetrics)>,
    ) -> ProcessingResult {
        match outcome {
            Ok((path, metrics)) => {
                self.transition(RunState::Completed);
                info!(
                    output = %path.display(),
                    total_secs = metrics.total_time_secs,
                    units = metrics.frames_processed,
                    "{what} completed"
                );
                ProcessingResult::completed(path, metrics)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                if matches!(e, UpscalerError::Cancelled) {
                    warn!(input = %input.display(), "{what} cancelled");
                } else {
                    error!(input = %input.display(), kind = ?e.kind(), error = %e, "{what} failed");
                }
                ProcessingResult::failed(&e)
            }
        }
    }

    /// Progress callback and log checkpoint for `done` of `total` units.
    fn checkpoint(
        &self,
        done: u64,
        total: u64,
        eta: &RollingEta,
        progress: &mut dyn FnMut(u64, u64, f64),
        unit: &str,
    ) {
        let remaining = eta.eta_secs(total);
        if self.config.progress_every > 0 && done % self.config.progress_every == 0 {
            progress(done, total, remaining);
        }
        if self.config.log_every > 0 && done % self.config.log_every == 0 {
            let percent = if total > 0 {
                done as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            info!(done, total, eta_secs = remaining, "Processed {done}/{total} {unit} ({percent:.1}%)");
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(UpscalerError::Cancelled);
        }
        Ok(())
    }

    // ── Spatial upscaling ────────────────────────────────────────

    /// Upscale `job.input` with `enhancer`.
    ///
    /// `progress` receives `(frames done, frames total, eta seconds)`.
    pub fn upscale_video(
        &mut self,
        job: &UpscaleJob,
        enhancer: &mut dyn FrameEnhancer,
        mut progress: impl FnMut(u64, u64, f64),
    ) -> ProcessingResult {
        self.transition(RunState::Idle);
        let outcome = self.run_upscale(job, enhancer, &mut progress);
        self.finish_run("Video upscaling", &job.input, outcome)
    }

    /// Upscale the first preview window of `input`.
    pub fn upscale_preview(
        &mut self,
        input: &Path,
        output: &Path,
        scale: f64,
        enhancer: &mut dyn FrameEnhancer,
        progress: impl FnMut(u64, u64, f64),
    ) -> ProcessingResult {
        info!(seconds = self.config.preview_seconds, input = %input.display(), "Creating upscaling preview");
        let job = UpscaleJob::new(input, output, scale).with_preview(self.config.preview_seconds);
        self.upscale_video(&job, enhancer, progress)
    }

    fn run_upscale(
        &mut self,
        job: &UpscaleJob,
        enhancer: &mut dyn FrameEnhancer,
        progress: &mut dyn FnMut(u64, u64, f64),
    ) -> Result<(PathBuf, ProcessingMetrics)> {
        let started = Instant::now();
        info!(
            input = %job.input.display(),
            output = %job.output.display(),
            scale = job.scale,
            enhancer = enhancer.name(),
            "Starting video upscaling"
        );

        self.transition(RunState::Validating);
        let mut source = self.backend.open_source(&job.input)?;
        let metadata = *source.metadata();
        let plan = scale_plan::plan(
            job.scale,
            enhancer.native_ratio().factor(),
            metadata.resolution(),
        )?;
        let target = plan.target();
        target.check_output_ceiling()?;
        let range = job.window.resolve(&metadata);
        let total = range.end.saturating_sub(range.start);
        if total == 0 {
            return Err(UpscalerError::Decoder(format!(
                "No frames to process in {}",
                job.input.display()
            )));
        }
        info!(
            input_resolution = %metadata.resolution(),
            output_resolution = %target,
            megapixels = target.megapixels(),
            fps = metadata.fps(),
            frames = total,
            steps = ?plan.steps(),
            "Upscaling plan ready"
        );

        self.transition(RunState::Planning);
        self.plan_resources(&plan, enhancer);

        self.transition(RunState::Streaming);
        let audio_source = (range.start == 0 && source.has_audio()).then(|| job.input.clone());
        let mut sink = self.backend.open_sink(SinkSpec {
            path: job.output.clone(),
            frame_rate: metadata.frame_rate,
            resolution: target,
            audio_source,
        })?;

        let mut eta = RollingEta::new(self.config.eta_window);
        let mut processed = 0u64;
        {
            let mut frames = source.frames(range)?;
            loop {
                self.check_cancelled()?;
                let Some(item) = frames.next() else { break };
                let (index, frame) = item?;
                let frame_started = Instant::now();

                let upscaled = plan.apply(frame, enhancer).map_err(|e| {
                    error!(frame = index, error = %e, "Enhancement failed");
                    e
                })?;
                sink.write(&upscaled)?;

                processed += 1;
                eta.record(frame_started.elapsed());
                self.checkpoint(processed, total, &eta, progress, "frames");
                if self.config.reclaim_every > 0 && processed % self.config.reclaim_every == 0 {
                    enhancer.reclaim();
                }
            }
        }
        if processed == 0 {
            return Err(UpscalerError::Decoder(format!(
                "No frames decoded from {}",
                job.input.display()
            )));
        }

        self.transition(RunState::Finalizing);
        let output = finalize(sink)?;

        let total_secs = started.elapsed().as_secs_f64();
        info!(
            total_secs,
            avg_secs_per_frame = total_secs / processed as f64,
            "Upscaling finished"
        );
        Ok((
            output,
            ProcessingMetrics {
                total_time_secs: total_secs,
                frames_processed: processed,
                avg_time_per_unit: total_secs / processed as f64,
                input_resolution: Some(metadata.resolution().to_string()),
                output_resolution: Some(target.to_string()),
                scale_factor: Some(job.scale),
                original_fps: Some(metadata.fps()),
                new_fps: Some(metadata.fps()),
                original_frame_count: Some(total),
                output_frame_count: Some(processed),
                ..Default::default()
            },
        ))
    }

    /// Derive the run's profile and hand it to the enhancer. Insufficient
    /// memory is only reported.
    fn plan_resources(&self, plan: &ScalePlan, enhancer: &mut dyn FrameEnhancer) {
        let projected = plan
            .enhancer_inputs()
            .into_iter()
            .map(|res| enhancer.estimate_memory_gb(res))
            .fold(0.0, f64::max);
        let profile = self.planner.adjust_for(plan.target(), projected);
        if plan.enhancer_passes() > 0 {
            let (sufficient, message) = self.planner.check_sufficiency(projected);
            if sufficient {
                info!("{message}");
            } else {
                warn!(required_gb = projected, "{message} Continuing anyway.");
            }
        }
        debug!(
            batch = profile.batch_size,
            tile = profile.tile_size,
            reduced_precision = profile.reduced_precision,
            "Run profile"
        );
        enhancer.configure(&profile.hints());
    }

    // ── Frame-rate interpolation ─────────────────────────────────

    /// Raise the frame rate of `job.input` with `interpolator`.
    ///
    /// `progress` receives `(pairs done, pairs total, eta seconds)`.
    pub fn interpolate_video(
        &mut self,
        job: &InterpolationJob,
        interpolator: &mut dyn FrameInterpolator,
        mut progress: impl FnMut(u64, u64, f64),
    ) -> ProcessingResult {
        self.transition(RunState::Idle);
        let outcome = self.run_interpolate(job, interpolator, &mut progress);
        self.finish_run("Frame interpolation", &job.input, outcome)
    }

    /// Interpolate the first preview window of `input`.
    pub fn interpolate_preview(
        &mut self,
        input: &Path,
        output: &Path,
        rate: FrameRateTarget,
        interpolator: &mut dyn FrameInterpolator,
        progress: impl FnMut(u64, u64, f64),
    ) -> ProcessingResult {
        info!(seconds = self.config.preview_seconds, input = %input.display(), "Creating interpolation preview");
        let job =
            InterpolationJob::new(input, output, rate).with_preview(self.config.preview_seconds);
        self.interpolate_video(&job, interpolator, progress)
    }

    /// Integer multiplier for a request against a source frame rate.
    ///
    /// Requested rates above the configured maximum are capped, and the
    /// multiplier never takes `source_fps * m` past that maximum. Ties
    /// round to even. Results below 2 mean no interpolation is needed.
    pub fn resolve_multiplier(&self, rate: FrameRateTarget, source_fps: f64) -> Result<u32> {
        if source_fps.is_nan() || source_fps <= 0.0 {
            return Err(UpscalerError::InvalidParameter(
                "Source frame rate is unknown".into(),
            ));
        }
        let target_fps = match rate {
            FrameRateTarget::Multiplier(0) => return Err(UpscalerError::InvalidMultiplier(0)),
            FrameRateTarget::Multiplier(m) => source_fps * m as f64,
            FrameRateTarget::Fps(fps) if !fps.is_finite() || fps <= 0.0 => {
                return Err(UpscalerError::InvalidParameter(format!(
                    "Invalid target frame rate: {fps}"
                )))
            }
            FrameRateTarget::Fps(fps) => fps,
        };
        let max = self.config.max_target_fps;
        let target_fps = if target_fps > max {
            warn!(requested = target_fps, cap = max, "Target frame rate is very high, capping");
            max
        } else {
            target_fps
        };
        // The output is encoded at source * m, which must stay within the cap.
        let ceiling = (max / source_fps).floor();
        Ok(round_half_even(target_fps / source_fps).min(ceiling).max(0.0) as u32)
    }

    fn run_interpolate(
        &mut self,
        job: &InterpolationJob,
        interpolator: &mut dyn FrameInterpolator,
        progress: &mut dyn FnMut(u64, u64, f64),
    ) -> Result<(PathBuf, ProcessingMetrics)> {
        let started = Instant::now();
        info!(
            input = %job.input.display(),
            output = %job.output.display(),
            rate = ?job.rate,
            interpolator = interpolator.name(),
            "Starting frame interpolation"
        );

        self.transition(RunState::Validating);
        let mut source = self.backend.open_source(&job.input)?;
        let metadata = *source.metadata();
        let fps = metadata.fps();
        let multiplier = self.resolve_multiplier(job.rate, fps)?;

        if multiplier < 2 {
            warn!(multiplier, "Frame-rate multiplier below 2, copying input unchanged");
            drop(source);
            self.transition(RunState::Finalizing);
            self.backend.copy_passthrough(&job.input, &job.output)?;
            return Ok((
                job.output.clone(),
                ProcessingMetrics {
                    total_time_secs: started.elapsed().as_secs_f64(),
                    frames_processed: metadata.frame_count,
                    fps_multiplier: Some(1),
                    original_fps: Some(fps),
                    new_fps: Some(fps),
                    original_frame_count: Some(metadata.frame_count),
                    output_frame_count: Some(metadata.frame_count),
                    input_resolution: Some(metadata.resolution().to_string()),
                    output_resolution: Some(metadata.resolution().to_string()),
                    ..Default::default()
                },
            ));
        }

        let expander = TemporalExpander::new(multiplier)?;
        let range = job.window.resolve(&metadata);
        let frames_total = range.end.saturating_sub(range.start);
        if frames_total == 0 {
            return Err(UpscalerError::Decoder(format!(
                "No frames to interpolate in {}",
                job.input.display()
            )));
        }
        let pairs_total = frames_total - 1;
        let output_rate = metadata.frame_rate.multiplied(multiplier);
        info!(
            original_fps = fps,
            target_fps = output_rate.to_fps_f64(),
            multiplier,
            frames = frames_total,
            expected_output = expander.output_len(frames_total),
            "Interpolation plan ready"
        );

        self.transition(RunState::Planning);
        let projected = interpolator.estimate_memory_gb(metadata.resolution());
        let (sufficient, message) = self.planner.check_sufficiency(projected);
        if sufficient {
            info!("{message}");
        } else {
            warn!(required_gb = projected, "{message} Continuing anyway.");
        }

        self.transition(RunState::Streaming);
        let audio_source = (range.start == 0 && source.has_audio()).then(|| job.input.clone());
        let mut sink = self.backend.open_sink(SinkSpec {
            path: job.output.clone(),
            frame_rate: output_rate,
            resolution: metadata.resolution(),
            audio_source,
        })?;

        let mut eta = RollingEta::new(self.config.eta_window);
        let mut pairs_done = 0u64;
        let mut decoded = 0u64;
        let mut written = 0u64;
        {
            let mut frames = source.frames(range)?;
            let Some(first) = frames.next() else {
                return Err(UpscalerError::Decoder(format!(
                    "No frames decoded from {}",
                    job.input.display()
                )));
            };
            let (_, mut previous) = first?;
            decoded += 1;

            loop {
                self.check_cancelled()?;
                let Some(item) = frames.next() else { break };
                let (index, next) = item?;
                decoded += 1;
                let pair_started = Instant::now();

                let between = expander
                    .expand_pair(&previous, &next, interpolator)
                    .map_err(|e| {
                        error!(pair_end = index, error = %e, "Interpolation failed");
                        e
                    })?;
                sink.write(&previous)?;
                for frame in &between {
                    sink.write(frame)?;
                }
                written += 1 + between.len() as u64;
                previous = next;

                pairs_done += 1;
                eta.record(pair_started.elapsed());
                self.checkpoint(pairs_done, pairs_total, &eta, progress, "frame pairs");
                if self.config.reclaim_every > 0 && pairs_done % self.config.reclaim_every == 0 {
                    interpolator.reclaim();
                }
            }
            sink.write(&previous)?;
            written += 1;
        }

        self.transition(RunState::Finalizing);
        let output = finalize(sink)?;

        let total_secs = started.elapsed().as_secs_f64();
        info!(
            original_frames = decoded,
            output_frames = written,
            "FPS: {:.2} -> {:.2}",
            fps,
            output_rate.to_fps_f64()
        );
        Ok((
            output,
            ProcessingMetrics {
                total_time_secs: total_secs,
                frames_processed: pairs_done,
                avg_time_per_unit: if pairs_done > 0 {
                    total_secs / pairs_done as f64
                } else {
                    0.0
                },
                input_resolution: Some(metadata.resolution().to_string()),
                output_resolution: Some(metadata.resolution().to_string()),
                fps_multiplier: Some(multiplier),
                original_fps: Some(fps),
                new_fps: Some(output_rate.to_fps_f64()),
                original_frame_count: Some(decoded),
                output_frame_count: Some(written),
                ..Default::default()
            },
        ))
    }
}

fn finalize(sink: Box<dyn FrameSink>) -> Result<PathBuf> {
    let frames = sink.frames_written();
    let path = sink.finish()?;
    debug!(frames, path = %path.display(), "Sink finalized");
    Ok(path)
}

/// Open `input` and return its metadata without processing anything.
pub fn inspect<B: MediaBackend>(backend: &B, input: &Path) -> Result<VideoMetadata> {
    let source = backend.open_source(input)?;
    Ok(*source.metadata())
}

/// Round to the nearest integer, ties to even.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (r - x).abs() == 0.5 && r % 2.0 != 0.0 {
        r - (r - x).signum()
    } else {
        r
    }
}
