//! Audio extraction: arbitrary container in, mono PCM waveform at a fixed
//! sample rate out.
//!
//! Decoding runs through an ordered chain of strategies; the first success
//! wins and individual failures are swallowed and logged. Only when every
//! strategy has failed does extraction fail, with a diagnostic that carries
//! each attempt's error.

mod demux;
mod ffmpeg;
mod resample;
mod strategy;
mod wav;

pub use strategy::DecodeStrategy;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct AudioExtractor {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl Default for AudioExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioExtractor {
    /// Preference order: system ffmpeg, container demux (video-aware), plain
    /// WAV reader, decode + sinc resample.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(ffmpeg::FfmpegCli),
                Box::new(demux::ContainerDemux),
                Box::new(wav::WavReader),
                Box::new(resample::DecodeResample),
            ],
        }
    }

    /// Extract `input` into a mono WAV at `target_sample_rate` inside
    /// `out_dir`. Returns the output path and the source duration in seconds.
    ///
    /// The output name is derived from the input's stem plus a suffix
    /// encoding mono/rate, so re-extracting the same input overwrites the
    /// same file.
    pub fn extract(
        &self,
        input: &Path,
        out_dir: &Path,
        target_sample_rate: u32,
    ) -> Result<(PathBuf, f64)> {
        std::fs::create_dir_all(out_dir).context("Failed to create processed directory")?;

        let wav_path = out_dir.join(output_name(input, target_sample_rate));
        let mut failures: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            match strategy.extract(input, &wav_path, target_sample_rate) {
                Ok(duration) => {
                    info!(
                        "Extracted {:?} via {} ({:.1}s) -> {:?}",
                        input,
                        strategy.name(),
                        duration,
                        wav_path
                    );
                    return Ok((wav_path, duration));
                }
                Err(e) => {
                    warn!("{} extraction failed for {:?}: {:#}", strategy.name(), input, e);
                    failures.push(format!("{}: {:#}", strategy.name(), e));
                }
            }
        }

        bail!(failures.join("; "))
    }
}

fn output_name(input: &Path, target_sample_rate: u32) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    format!("{}_mono{}k.wav", stem, target_sample_rate / 1000)
}

/// Write a mono waveform as 16-bit PCM.
pub fn write_mono_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV {:?}", path))?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .context("Failed to write sample")?;
    }
    writer.finalize().context("Failed to finalize WAV")?;

    Ok(())
}

/// Load a mono waveform produced by [`write_mono_wav`] (or any WAV; channels
/// are downmixed).
pub fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    wav::read_wav_mono(path)
}
