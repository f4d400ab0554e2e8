//! Output file naming.

use std::path::{Path, PathBuf};

fn stem_and_ext(input: &Path) -> (String, String) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "mp4".to_string());
    (stem, ext)
}

/// `4.0` prints as `4`, `2.5` as `2.5`.
fn format_scale(scale: f64) -> String {
    if scale.fract() == 0.0 {
        format!("{}", scale as u64)
    } else {
        let s = format!("{scale:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// `dir/{stem}_upscaled_{scale}x.{ext}`
pub fn upscaled_output_path(dir: &Path, input: &Path, scale: f64) -> PathBuf {
    let (stem, ext) = stem_and_ext(input);
    dir.join(format!("{stem}_upscaled_{}x.{ext}", format_scale(scale)))
}

/// `dir/{stem}_{multiplier}xfps.{ext}`
pub fn interpolated_output_path(dir: &Path, input: &Path, multiplier: u32) -> PathBuf {
    let (stem, ext) = stem_and_ext(input);
    dir.join(format!("{stem}_{multiplier}xfps.{ext}"))
}

/// `dir/{stem}_preview.{ext}` next to a full-run output name.
pub fn preview_path(output: &Path) -> PathBuf {
    let (stem, ext) = stem_and_ext(output);
    let name = format!("{stem}_preview.{ext}");
    match output.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}
