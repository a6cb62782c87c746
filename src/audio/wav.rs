//! Plain WAV strategy: hound decode at native rate plus linear-interpolation
//! resampling. Good enough for speech; the sinc strategy below it in the
//! chain covers anything where interpolation quality matters.

use anyhow::{Context, Result};
use std::path::Path;

use super::strategy::{downmix_mono, DecodeStrategy};

/// Resample with linear interpolation.
pub(crate) fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut resampled = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let sample = if src_idx + 1 < samples.len() {
            samples[src_idx] as f64 * (1.0 - frac) + samples[src_idx + 1] as f64 * frac
        } else if src_idx < samples.len() {
            samples[src_idx] as f64
        } else {
            0.0
        };

        resampled.push(sample as f32);
    }

    resampled
}

/// Read a WAV file into mono f32 samples at its native rate.
pub(crate) fn read_wav_mono(input: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(input).with_context(|| format!("Failed to open WAV {:?}", input))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read integer samples")?
        }
    };

    Ok((
        downmix_mono(&interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

pub struct WavReader;

impl DecodeStrategy for WavReader {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn extract(&self, input: &Path, wav_path: &Path, target_sample_rate: u32) -> Result<f64> {
        let (mono, native_rate) = read_wav_mono(input)?;
        let duration = mono.len() as f64 / native_rate as f64;

        let resampled = resample_linear(&mono, native_rate, target_sample_rate);
        super::write_mono_wav(wav_path, &resampled, target_sample_rate)?;

        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(resample_linear(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_downsample_length() {
        let samples: Vec<f32> = (0..48).map(|i| i as f32).collect();
        assert_eq!(resample_linear(&samples, 48000, 16000).len(), 16);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample_linear(&[], 48000, 16000).is_empty());
    }
}
