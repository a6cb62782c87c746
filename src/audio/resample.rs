//! Last-resort strategy: symphonia decode plus rubato sinc resampling, with
//! duration computed as sample count over rate.

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;

use super::demux::decode_to_mono;
use super::strategy::DecodeStrategy;

const CHUNK_SIZE: usize = 1024;

/// Sinc resample a mono waveform.
fn resample_sinc(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f64>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        CHUNK_SIZE,
        1,
    )
    .context("Failed to build resampler")?;

    let mut out = Vec::new();
    let mut pos = 0;

    while pos + CHUNK_SIZE <= samples.len() {
        let chunk: Vec<f64> = samples[pos..pos + CHUNK_SIZE]
            .iter()
            .map(|&s| s as f64)
            .collect();
        let frames = resampler
            .process(&[chunk], None)
            .context("Resampler chunk failed")?;
        out.extend(frames[0].iter().map(|&s| s as f32));
        pos += CHUNK_SIZE;
    }

    if pos < samples.len() {
        let chunk: Vec<f64> = samples[pos..].iter().map(|&s| s as f64).collect();
        let frames = resampler
            .process_partial(Some(&[chunk]), None)
            .context("Resampler tail failed")?;
        out.extend(frames[0].iter().map(|&s| s as f32));
    }

    Ok(out)
}

pub struct DecodeResample;

impl DecodeStrategy for DecodeResample {
    fn name(&self) -> &'static str {
        "decode+resample"
    }

    fn extract(&self, input: &Path, wav_path: &Path, target_sample_rate: u32) -> Result<f64> {
        let (mono, native_rate) = decode_to_mono(input)?;
        let resampled = resample_sinc(&mono, native_rate, target_sample_rate)?;

        let duration = resampled.len() as f64 / target_sample_rate as f64;
        super::write_mono_wav(wav_path, &resampled, target_sample_rate)?;

        Ok(duration)
    }
}
