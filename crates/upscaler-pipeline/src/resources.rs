//! Compute-device detection and resource planning.
//!
//! [`ResourcePlanner::detect`] probes the machine once per process. The
//! orchestrator receives a planner at construction and derives a per-run
//! [`ResourceProfile`] from it with [`ResourcePlanner::adjust_for`]; the
//! detected profile itself never changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use upscaler_ai::ProcessingHints;
use upscaler_core::memory_budget::{BATCH_HALVING_PIXELS, NEAR_8K_MAX_TILE, NEAR_8K_PIXELS};
use upscaler_core::{Resolution, VideoMetadata};

/// System memory assumed when it cannot be read.
const FALLBACK_SYSTEM_MEMORY_GB: f64 = 16.0;

/// Share of accelerator memory a run may project before batching is halved.
const MEMORY_PRESSURE_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Cuda,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        })
    }
}

/// What was found on the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub kind: DeviceKind,
    pub name: String,
    pub platform: String,
    pub memory_total_gb: f64,
    pub memory_available_gb: f64,
    pub cpu_count: usize,
    pub system_memory_gb: f64,
}

impl DeviceInfo {
    /// A machine without an accelerator.
    pub fn cpu(cpu_count: usize, system_memory_gb: f64) -> Self {
        Self {
            kind: DeviceKind::Cpu,
            name: "CPU".to_string(),
            platform: std::env::consts::OS.to_string(),
            memory_total_gb: 0.0,
            memory_available_gb: 0.0,
            cpu_count,
            system_memory_gb,
        }
    }

    /// A machine with one accelerator.
    pub fn cuda(name: impl Into<String>, total_gb: f64, available_gb: f64) -> Self {
        Self {
            kind: DeviceKind::Cuda,
            name: name.into(),
            memory_total_gb: total_gb,
            memory_available_gb: available_gb.clamp(0.0, total_gb.max(0.0)),
            ..Self::cpu(num_cpus::get(), FALLBACK_SYSTEM_MEMORY_GB)
        }
    }

    pub fn has_accelerator(&self) -> bool {
        self.kind == DeviceKind::Cuda
    }
}

/// Recommended processing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub device: DeviceKind,
    pub available_memory_gb: f64,
    pub batch_size: u32,
    /// Tile edge in pixels; 0 processes whole frames.
    pub tile_size: u32,
    pub reduced_precision: bool,
    pub max_scale_factor: u32,
    pub temporal_coherence: bool,
}

impl ResourceProfile {
    /// Tiered defaults for a device.
    pub fn for_device(device: &DeviceInfo) -> Self {
        if !device.has_accelerator() {
            return Self {
                device: DeviceKind::Cpu,
                available_memory_gb: 0.0,
                batch_size: 1,
                tile_size: 0,
                reduced_precision: false,
                max_scale_factor: 2,
                temporal_coherence: false,
            };
        }

        let mem = device.memory_available_gb;
        let (batch_size, tile_size, max_scale_factor, temporal_coherence) = if mem >= 16.0 {
            (16, 512, 8, true)
        } else if mem >= 8.0 {
            (8, 384, 4, true)
        } else if mem >= 4.0 {
            (4, 256, 2, false)
        } else {
            (1, 128, 2, false)
        };

        Self {
            device: DeviceKind::Cuda,
            available_memory_gb: mem,
            batch_size,
            tile_size,
            reduced_precision: true,
            max_scale_factor,
            temporal_coherence,
        }
    }

    /// Parameters handed to the enhancement capability.
    pub fn hints(&self) -> ProcessingHints {
        ProcessingHints {
            tile_size: self.tile_size,
            batch_size: self.batch_size,
            reduced_precision: self.reduced_precision,
        }
    }
}

/// Expected wall-clock time for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeEstimate {
    /// Frames (upscaling) or frame pairs (interpolation).
    pub units: u64,
    pub secs_per_unit: f64,
    pub total_secs: f64,
}

impl TimeEstimate {
    fn new(units: u64, secs_per_unit: f64) -> Self {
        Self {
            units,
            secs_per_unit,
            total_secs: secs_per_unit * units as f64,
        }
    }

    /// "1h 2m 3s", "2m 3s" or "3s".
    pub fn formatted(&self) -> String {
        format_duration(self.total_secs)
    }
}

/// Render seconds as "1h 2m 3s", "2m 3s" or "3s".
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Device summary and the profile derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePlanner {
    device: DeviceInfo,
    profile: ResourceProfile,
}

static DETECTED: OnceLock<ResourcePlanner> = OnceLock::new();

impl ResourcePlanner {
    /// Probe the machine on first call; later calls return the same planner.
    pub fn detect() -> &'static ResourcePlanner {
        DETECTED.get_or_init(|| {
            let planner = Self::from_device(probe_device());
            info!(
                device = %planner.device.name,
                kind = %planner.device.kind,
                memory_gb = planner.device.memory_available_gb,
                batch = planner.profile.batch_size,
                tile = planner.profile.tile_size,
                "Compute device detected"
            );
            planner
        })
    }

    pub fn from_device(device: DeviceInfo) -> Self {
        let profile = ResourceProfile::for_device(&device);
        Self { device, profile }
    }

    /// Planner for a machine without an accelerator.
    pub fn cpu_only() -> Self {
        Self::from_device(DeviceInfo::cpu(num_cpus::get(), system_memory_gb()))
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// The profile recommended for this device before any per-run changes.
    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    /// Profile for one run producing `target` frames, given the projected
    /// memory of the capability.
    pub fn adjust_for(&self, target: Resolution, projected_gb: f64) -> ResourceProfile {
        let mut adjusted = self.profile.clone();
        let pixels = target.pixels();

        if pixels > BATCH_HALVING_PIXELS {
            adjusted.batch_size = (adjusted.batch_size / 2).max(1);
        }
        if pixels > NEAR_8K_PIXELS {
            adjusted.batch_size = 1;
            adjusted.tile_size = match adjusted.tile_size {
                0 => NEAR_8K_MAX_TILE,
                t => t.min(NEAR_8K_MAX_TILE),
            };
        }
        if self.device.has_accelerator()
            && projected_gb > self.device.memory_available_gb * MEMORY_PRESSURE_RATIO
        {
            adjusted.batch_size = (adjusted.batch_size / 2).max(1);
        }

        debug!(
            %target,
            projected_gb,
            batch = adjusted.batch_size,
            tile = adjusted.tile_size,
            "Adjusted resource profile"
        );
        adjusted
    }

    /// Whether `required_gb` fits in available accelerator memory.
    ///
    /// Advisory only: callers log the message and carry on.
    pub fn check_sufficiency(&self, required_gb: f64) -> (bool, String) {
        if !self.device.has_accelerator() {
            return (
                false,
                "No accelerator available. CPU mode will be used (slower).".to_string(),
            );
        }
        let available = self.device.memory_available_gb;
        if available >= required_gb {
            (
                true,
                format!("Sufficient memory: {available:.1} GB available"),
            )
        } else {
            (
                false,
                format!(
                    "Insufficient memory: {available:.1} GB available, {required_gb:.1} GB required. \
                     Consider reducing scale factor or batch size."
                ),
            )
        }
    }

    /// Expected time to upscale every frame of `metadata` by `scale`.
    pub fn estimate_upscale_time(&self, metadata: &VideoMetadata, scale: f64) -> TimeEstimate {
        let per_frame = if self.device.has_accelerator() {
            let total = self.device.memory_total_gb;
            if total >= 12.0 {
                0.05
            } else if total >= 8.0 {
                0.15
            } else if total >= 6.0 {
                0.3
            } else {
                0.5
            }
        } else {
            3.0
        };
        TimeEstimate::new(metadata.frame_count, per_frame * scale / 4.0)
    }

    /// Expected time to interpolate every pair of `metadata` by `multiplier`.
    pub fn estimate_interpolation_time(
        &self,
        metadata: &VideoMetadata,
        multiplier: u32,
    ) -> TimeEstimate {
        let per_pair = if self.device.has_accelerator() {
            let total = self.device.memory_total_gb;
            if total >= 8.0 {
                0.2
            } else if total >= 4.0 {
                0.4
            } else {
                0.6
            }
        } else {
            2.0
        };
        TimeEstimate::new(
            metadata.frame_count.saturating_sub(1),
            per_pair * multiplier as f64 / 2.0,
        )
    }

    /// Human-readable device and settings summary.
    pub fn info_string(&self) -> String {
        let d = &self.device;
        let p = &self.profile;
        let mut lines = vec![
            format!("Platform: {}", d.platform),
            format!("Device: {}", d.name),
        ];
        if d.has_accelerator() {
            lines.push("CUDA: Available".to_string());
            lines.push(format!(
                "VRAM: {:.1} GB available / {:.1} GB total",
                d.memory_available_gb, d.memory_total_gb
            ));
        } else {
            lines.push("CUDA: Not available (CPU mode)".to_string());
        }
        lines.push(format!("CPU Cores: {}", d.cpu_count));
        lines.push(format!("RAM: {:.1} GB", d.system_memory_gb));
        lines.push(String::new());
        lines.push("Recommended Settings:".to_string());
        lines.push(format!("  Device: {}", p.device));
        lines.push(format!("  Batch Size: {}", p.batch_size));
        lines.push(if p.tile_size == 0 {
            "  Tile Size: whole frame".to_string()
        } else {
            format!("  Tile Size: {}", p.tile_size)
        });
        lines.push(format!("  Max Scale: {}x", p.max_scale_factor));
        lines.push(format!(
            "  Reduced Precision: {}",
            if p.reduced_precision { "Enabled" } else { "Disabled" }
        ));
        lines.push(format!(
            "  Temporal Coherence: {}",
            if p.temporal_coherence { "Enabled" } else { "Disabled" }
        ));
        lines.join("\n")
    }
}

fn probe_device() -> DeviceInfo {
    let cpu_count = num_cpus::get();
    let system_memory = system_memory_gb();
    match query_nvidia_smi() {
        Some((name, total_gb, available_gb)) => DeviceInfo {
            cpu_count,
            system_memory_gb: system_memory,
            ..DeviceInfo::cuda(name, total_gb, available_gb)
        },
        None => DeviceInfo::cpu(cpu_count, system_memory),
    }
}

fn query_nvidia_smi() -> Option<(String, f64, f64)> {
    let program = which::which("nvidia-smi").ok()?;
    let output = Command::new(program)
        .args([
            "--query-gpu=name,memory.total,memory.used",
            "--format=csv,noheader,nounits",
        ])
        .output();
    match output {
        Ok(out) if out.status.success() => {
            parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout))
        }
        Ok(out) => {
            warn!(status = %out.status, "nvidia-smi failed, assuming CPU");
            None
        }
        Err(e) => {
            warn!(error = %e, "Could not run nvidia-smi, assuming CPU");
            None
        }
    }
}

/// Parse the first GPU from `name, total MiB, used MiB` CSV output.
pub fn parse_nvidia_smi(output: &str) -> Option<(String, f64, f64)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split(',').map(str::trim);
    let name = fields.next()?.to_string();
    let total_mib: f64 = fields.next()?.parse().ok()?;
    let used_mib: f64 = fields.next()?.parse().ok()?;
    let total_gb = total_mib / 1024.0;
    let available_gb = ((total_mib - used_mib) / 1024.0).max(0.0);
    Some((name, total_gb, available_gb))
}

/// Total system memory in GB from `/proc/meminfo`.
pub fn parse_meminfo(text: &str) -> Option<f64> {
    let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib / (1024.0 * 1024.0))
}

fn system_memory_gb() -> f64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|text| parse_meminfo(&text))
        .unwrap_or(FALLBACK_SYSTEM_MEMORY_GB)
}
