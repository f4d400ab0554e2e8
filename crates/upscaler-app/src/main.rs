//! Video Upscaler Pro - command-line front-end
//!
//! Runs upscaling and interpolation jobs on a blocking worker, relays
//! progress to the terminal and turns Ctrl-C into a cooperative cancel.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::{Receiver, Sender};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use upscaler_ai::{create_enhancer, create_interpolator, InterpolatorKind, ModelStore, NativeRatio};
use upscaler_media::FfmpegBackend;
use upscaler_pipeline::resources::format_duration;
use upscaler_pipeline::{
    inspect, preview_path, CancelToken, FrameRateTarget, InterpolationJob, Orchestrator,
    PipelineConfig, ProcessingResult, ResourcePlanner, UpscaleJob,
};

#[derive(Parser, Debug)]
#[command(
    name = "upscaler",
    version,
    about = "AI video upscaling and frame interpolation",
    arg_required_else_help = true,
    after_help = "Examples:\n  upscaler upscale clip.mp4 --scale 4\n  upscaler upscale clip.mp4 --scale 2.5 --preview\n  upscaler interpolate clip.mp4 --target-fps 60\n  upscaler estimate clip.mp4 --scale 4 --multiplier 2\n  upscaler info"
)]
struct Cli {
    /// JSON pipeline configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the result as JSON on stdout.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upscale a video by an arbitrary factor.
    Upscale(UpscaleArgs),
    /// Raise the frame rate of a video.
    Interpolate(InterpolateArgs),
    /// Estimate processing time without running anything.
    Estimate(EstimateArgs),
    /// Show the detected device and recommended settings.
    Info,
}

#[derive(Args, Debug)]
struct UpscaleArgs {
    /// Input video file.
    input: PathBuf,

    /// Scale factor in (0, 16].
    #[arg(short, long, default_value_t = 2.0)]
    scale: f64,

    /// Output file (default: <output dir>/<stem>_upscaled_<scale>x.<ext>).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only process the first few seconds.
    #[arg(long, default_value_t = false)]
    preview: bool,
}

#[derive(Args, Debug)]
struct InterpolateArgs {
    /// Input video file.
    input: PathBuf,

    /// Frame-rate multiplier.
    #[arg(short, long, conflicts_with = "target_fps")]
    multiplier: Option<u32>,

    /// Target frame rate, capped at the configured maximum.
    #[arg(long)]
    target_fps: Option<f64>,

    /// Output file (default: <output dir>/<stem>_<m>xfps.<ext>).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Interpolation method.
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Only process the first few seconds.
    #[arg(long, default_value_t = false)]
    preview: bool,
}

#[derive(Args, Debug)]
struct EstimateArgs {
    /// Input video file.
    input: PathBuf,

    /// Scale factor to estimate upscaling for.
    #[arg(short, long)]
    scale: Option<f64>,

    /// Multiplier to estimate interpolation for.
    #[arg(short, long)]
    multiplier: Option<u32>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum MethodArg {
    Rife,
    Flow,
    Blend,
}

impl From<MethodArg> for InterpolatorKind {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Rife => Self::Rife,
            MethodArg::Flow => Self::Flow,
            MethodArg::Blend => Self::Blend,
        }
    }
}

/// Progress message sent from the worker.
#[derive(Debug, Clone, Copy)]
struct ProgressUpdate {
    done: u64,
    total: u64,
    eta_secs: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::from_env(),
    };

    match cli.command {
        Commands::Info => run_info(&config, cli.json),
        Commands::Estimate(args) => run_estimate(args, cli.json),
        Commands::Upscale(args) => {
            let result = run_upscale(config, args).await?;
            report(&result, cli.json)
        }
        Commands::Interpolate(args) => {
            let result = run_interpolate(config, args).await?;
            report(&result, cli.json)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn model_store(config: &PipelineConfig) -> ModelStore {
    match &config.model_dir {
        Some(dir) => ModelStore::new(dir),
        None => ModelStore::default(),
    }
}

fn require_ffmpeg() -> Result<()> {
    if !FfmpegBackend::is_available() {
        bail!("ffmpeg was not found on PATH; install FFmpeg to process videos");
    }
    Ok(())
}

async fn run_upscale(config: PipelineConfig, args: UpscaleArgs) -> Result<ProcessingResult> {
    require_ffmpeg()?;
    let planner = ResourcePlanner::detect().clone();
    let store = model_store(&config);
    let preview_secs = config.preview_seconds;

    run_on_worker(move |cancel, progress| {
        let mut enhancer = create_enhancer(NativeRatio::for_scale(args.scale), &store);
        let mut orchestrator = Orchestrator::new(
            FfmpegBackend::new(config.encoder.clone()),
            planner,
            config,
        )
        .with_cancel_token(cancel);

        let output = args
            .output
            .unwrap_or_else(|| orchestrator.upscale_output_for(&args.input, args.scale));
        let job = if args.preview {
            UpscaleJob::new(&args.input, preview_path(&output), args.scale)
                .with_preview(preview_secs)
        } else {
            UpscaleJob::new(&args.input, &output, args.scale)
        };
        orchestrator.upscale_video(&job, enhancer.as_mut(), relay(progress))
    })
    .await
}

async fn run_interpolate(
    config: PipelineConfig,
    args: InterpolateArgs,
) -> Result<ProcessingResult> {
    require_ffmpeg()?;
    let planner = ResourcePlanner::detect().clone();
    let store = model_store(&config);
    let kind = args.method.map(InterpolatorKind::from).unwrap_or(config.interpolator);
    let rate = match (args.multiplier, args.target_fps) {
        (_, Some(fps)) => FrameRateTarget::Fps(fps),
        (Some(m), None) => FrameRateTarget::Multiplier(m),
        (None, None) => FrameRateTarget::Multiplier(2),
    };
    let preview_secs = config.preview_seconds;

    run_on_worker(move |cancel, progress| {
        let mut interpolator = create_interpolator(kind, &store);
        let mut orchestrator = Orchestrator::new(
            FfmpegBackend::new(config.encoder.clone()),
            planner,
            config,
        )
        .with_cancel_token(cancel);

        let output = args.output.clone().unwrap_or_else(|| {
            let m = match rate {
                FrameRateTarget::Multiplier(m) => m,
                FrameRateTarget::Fps(_) => inspect(orchestrator.backend(), &args.input)
                    .ok()
                    .and_then(|meta| orchestrator.resolve_multiplier(rate, meta.fps()).ok())
                    .unwrap_or(2),
            };
            orchestrator.interpolation_output_for(&args.input, m)
        });
        let job = if args.preview {
            InterpolationJob::new(&args.input, preview_path(&output), rate)
                .with_preview(preview_secs)
        } else {
            InterpolationJob::new(&args.input, &output, rate)
        };
        orchestrator.interpolate_video(&job, interpolator.as_mut(), relay(progress))
    })
    .await
}

fn relay(progress: Sender<ProgressUpdate>) -> impl FnMut(u64, u64, f64) {
    move |done, total, eta_secs| {
        // The receiver only goes away once the run is over.
        let _ = progress.send(ProgressUpdate {
            done,
            total,
            eta_secs,
        });
    }
}

/// Run `job` on a blocking thread, logging its progress and cancelling it
/// on Ctrl-C.
async fn run_on_worker<F>(job: F) -> Result<ProcessingResult>
where
    F: FnOnce(CancelToken, Sender<ProgressUpdate>) -> ProcessingResult + Send + 'static,
{
    let cancel = CancelToken::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let worker_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || job(worker_cancel, tx));
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    let result = loop {
        tokio::select! {
            joined = &mut handle => {
                drain_progress(&rx);
                break joined.context("processing worker panicked")?;
            }
            signal = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Could not listen for Ctrl-C");
                } else {
                    warn!("Interrupted, stopping after the current frame");
                }
                cancel.cancel();
            }
            _ = ticker.tick() => drain_progress(&rx),
        }
    };
    Ok(result)
}

fn drain_progress(rx: &Receiver<ProgressUpdate>) {
    for update in rx.try_iter() {
        let percent = if update.total > 0 {
            update.done as f64 / update.total as f64 * 100.0
        } else {
            0.0
        };
        info!(
            done = update.done,
            total = update.total,
            eta = %format_duration(update.eta_secs),
            "Progress {percent:.1}%"
        );
    }
}

fn report(result: &ProcessingResult, json: bool) -> Result<()> {
    if json {
        println!("{}", result.to_json()?);
    } else if result.success {
        let m = &result.metrics;
        if let Some(path) = &result.output_path {
            println!("Output: {}", path.display());
        }
        if let (Some(input), Some(output)) = (&m.input_resolution, &m.output_resolution) {
            println!("Resolution: {input} -> {output}");
        }
        if let (Some(from), Some(to)) = (m.original_fps, m.new_fps) {
            println!("Frame rate: {from:.2} -> {to:.2} fps");
        }
        println!(
            "Processed {} units in {} ({:.3}s each)",
            m.frames_processed,
            format_duration(m.total_time_secs),
            m.avg_time_per_unit
        );
    }

    if !result.success {
        bail!(
            "{}",
            result.error.as_deref().unwrap_or("processing failed")
        );
    }
    Ok(())
}

fn run_info(config: &PipelineConfig, json: bool) -> Result<()> {
    let planner = ResourcePlanner::detect();
    let store = model_store(config);
    let cached: Vec<&str> = store.cached_models().iter().map(|m| m.key()).collect();

    if json {
        let value = serde_json::json!({
            "device": planner.device(),
            "profile": planner.profile(),
            "ffmpeg_available": FfmpegBackend::is_available(),
            "model_dir": store.model_dir(),
            "cached_models": cached,
            "output_dir": config.output_dir,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", planner.info_string());
    println!();
    println!(
        "FFmpeg: {}",
        if FfmpegBackend::is_available() {
            "available"
        } else {
            "not found"
        }
    );
    println!("Models: {}", store.model_dir().display());
    if cached.is_empty() {
        println!("  (none cached)");
    }
    for key in cached {
        println!("  {key}");
    }
    println!("Output directory: {}", config.output_dir.display());
    Ok(())
}

fn run_estimate(args: EstimateArgs, json: bool) -> Result<()> {
    require_ffmpeg()?;
    let metadata = inspect(&FfmpegBackend::default(), &args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let planner = ResourcePlanner::detect();

    let scale = match (args.scale, args.multiplier) {
        (None, None) => Some(2.0),
        (s, _) => s,
    };
    let upscale = scale.map(|s| planner.estimate_upscale_time(&metadata, s));
    let interpolate = args
        .multiplier
        .map(|m| planner.estimate_interpolation_time(&metadata, m));

    if json {
        let value = serde_json::json!({
            "input": args.input,
            "metadata": metadata,
            "upscale": upscale,
            "interpolate": interpolate,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_source(&args.input, &metadata);
    if let (Some(s), Some(est)) = (scale, upscale) {
        println!(
            "Upscale {s}x: {} frames, ~{:.2}s per frame, ~{} total",
            est.units,
            est.secs_per_unit,
            est.formatted()
        );
    }
    if let (Some(m), Some(est)) = (args.multiplier, interpolate) {
        println!(
            "Interpolate {m}x: {} pairs, ~{:.2}s per pair, ~{} total",
            est.units,
            est.secs_per_unit,
            est.formatted()
        );
    }
    Ok(())
}

fn print_source(input: &Path, metadata: &upscaler_core::VideoMetadata) {
    println!("Input: {}", input.display());
    println!(
        "  {} @ {:.3} fps, {} frames, {}",
        metadata.resolution(),
        metadata.fps(),
        metadata.frame_count,
        format_duration(metadata.duration)
    );
}
