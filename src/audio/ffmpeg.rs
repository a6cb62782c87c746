//! ffmpeg CLI strategy: resample through the system toolkit and probe the
//! source duration with ffprobe.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::warn;

use super::strategy::DecodeStrategy;

pub struct FfmpegCli;

impl FfmpegCli {
    /// Probe the source duration. Probe failure is not fatal; the pipeline
    /// records 0.0 rather than aborting extraction.
    fn probe_duration(input: &Path) -> f64 {
        let output = Command::new("ffprobe")
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input)
            .output();

        match output {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .trim()
                .parse::<f64>()
                .unwrap_or(0.0),
            Ok(out) => {
                warn!(
                    "ffprobe failed for {:?}: {}",
                    input,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                0.0
            }
            Err(e) => {
                warn!("ffprobe not runnable: {}", e);
                0.0
            }
        }
    }
}

impl DecodeStrategy for FfmpegCli {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn extract(&self, input: &Path, wav_path: &Path, target_sample_rate: u32) -> Result<f64> {
        which::which("ffmpeg").context("ffmpeg not found in PATH")?;

        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(target_sample_rate.to_string())
            .arg(wav_path)
            .output()
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg conversion failed: {}", stderr.trim());
        }

        if !wav_path.exists() {
            bail!("ffmpeg did not produce output file");
        }

        Ok(Self::probe_duration(input))
    }
}
