//! Container demux strategy: symphonia format probe + decode. Handles video
//! containers with embedded audio tracks (mp4/aac among others).

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

use super::strategy::{downmix_mono, DecodeStrategy};
use super::wav::resample_linear;

/// Decode any symphonia-supported container into a mono waveform at its
/// native sample rate. Errors with "no audio track" when the container holds
/// none (e.g. a video-only file).
pub(crate) fn decode_to_mono(input: &Path) -> Result<(Vec<f32>, u32)> {
    let file = File::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = input.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized container format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no audio track in container"))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("audio track has no sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e).context("Failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count();

                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                mono.extend(downmix_mono(buf.samples(), channels));
            }
            // Corrupt packets are skipped; a fully corrupt stream surfaces
            // below as empty output.
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet in {:?}: {}", input, e);
            }
            Err(e) => return Err(e).context("Decoder failed"),
        }
    }

    if mono.is_empty() {
        bail!("decoded zero audio samples");
    }

    Ok((mono, sample_rate))
}

pub struct ContainerDemux;

impl DecodeStrategy for ContainerDemux {
    fn name(&self) -> &'static str {
        "symphonia demux"
    }

    fn extract(&self, input: &Path, wav_path: &Path, target_sample_rate: u32) -> Result<f64> {
        let (mono, native_rate) = decode_to_mono(input)?;
        let duration = mono.len() as f64 / native_rate as f64;

        let resampled = resample_linear(&mono, native_rate, target_sample_rate);
        super::write_mono_wav(wav_path, &resampled, target_sample_rate)?;

        Ok(duration)
    }
}
