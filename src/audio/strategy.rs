//! Decode strategy interface for the extraction fallback chain.

use anyhow::Result;
use std::path::Path;

/// One way of turning an arbitrary media file into a mono PCM waveform at a
/// target sample rate. The chain tries strategies in preference order and
/// stops at the first success.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce `wav_path` (mono, `target_sample_rate`) from `input` and
    /// return the source duration in seconds.
    fn extract(&self, input: &Path, wav_path: &Path, target_sample_rate: u32) -> Result<f64>;
}

/// Downmix interleaved samples to mono by averaging channels.
pub fn downmix_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
