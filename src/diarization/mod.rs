//! Unsupervised speaker diarization.
//!
//! Lightweight clustering over per-segment spectral features: slice the
//! waveform by segment times, average a 13-coefficient MFCC across each
//! slice, pick the speaker count by silhouette score over seeded k-means
//! fits, then map cluster ids to "SPEAKER n" labels in order of first
//! occurrence so labeling is stable regardless of the clusterer's internal
//! id assignment.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use realfft::RealFftPlanner;
use tracing::info;

use crate::transcription::Segment;

const N_MFCC: usize = 13;
const N_MELS: usize = 26;
/// Segments shorter than this use a zero window instead of real audio.
const MIN_SEGMENT_SEC: f64 = 0.2;
/// Length of the substituted zero window.
const ZERO_WINDOW_SEC: f64 = 0.5;
/// Fixed seed keeps restarts deterministic across runs.
const KMEANS_SEED: u64 = 0;

/// Assign a speaker label to every segment, aligned 1:1 with the input.
pub fn assign_speakers(
    samples: &[f32],
    sample_rate: u32,
    segments: &[Segment],
    max_speakers: usize,
) -> Result<Vec<String>> {
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    let features = extract_features(samples, sample_rate, segments)?;

    let best_k = select_speaker_count(&features, max_speakers);
    let assignments = kmeans_fit(&features, best_k, 10, KMEANS_SEED);
    let labels = label_clusters(&assignments);

    info!(
        "Diarization assigned {} speakers across {} segments",
        best_k,
        segments.len()
    );

    Ok(labels)
}

/// One averaged MFCC vector per segment.
fn extract_features(
    samples: &[f32],
    sample_rate: u32,
    segments: &[Segment],
) -> Result<Vec<Vec<f64>>> {
    let sr = sample_rate as f64;
    let min_len = (sr * MIN_SEGMENT_SEC) as usize;
    let zero_window = vec![0.0f32; (sr * ZERO_WINDOW_SEC) as usize];

    let mut features = Vec::with_capacity(segments.len());
    for seg in segments {
        let start = ((seg.start * sr) as usize).min(samples.len());
        let end = ((seg.end * sr) as usize).min(samples.len());

        // Too short (or empty after clamping): zero window avoids degenerate
        // feature extraction, at the cost of identical features for every
        // such segment.
        let slice = if end <= start || end - start < min_len {
            &zero_window[..]
        } else {
            &samples[start..end]
        };

        features.push(mfcc_mean(slice, sample_rate)?);
    }

    Ok(features)
}

/// 13-coefficient MFCC averaged over 25 ms frames with a 10 ms hop.
fn mfcc_mean(samples: &[f32], sample_rate: u32) -> Result<Vec<f64>> {
    let frame_len = (sample_rate as f64 * 0.025) as usize;
    let hop = (sample_rate as f64 * 0.010) as usize;
    let n_fft = frame_len.next_power_of_two();
    let n_bins = n_fft / 2 + 1;

    // Pad short slices up to one full frame.
    let padded;
    let samples = if samples.len() < frame_len {
        padded = {
            let mut p = samples.to_vec();
            p.resize(frame_len, 0.0);
            p
        };
        &padded[..]
    } else {
        samples
    };

    let hann: Vec<f64> = (0..frame_len)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / frame_len as f64).cos())
        })
        .collect();
    let filterbank = mel_filterbank(sample_rate, n_fft, N_MELS);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    let mut acc = vec![0.0f64; N_MFCC];
    let mut frames = 0usize;
    let mut power = vec![0.0f64; n_bins];

    let mut start = 0;
    while start + frame_len <= samples.len() {
        for i in 0..n_fft {
            input[i] = if i < frame_len {
                samples[start + i] as f64 * hann[i]
            } else {
                0.0
            };
        }

        fft.process(&mut input, &mut spectrum)
            .ok()
            .context("FFT failed")?;

        for (bin, value) in spectrum.iter().enumerate() {
            power[bin] = value.norm_sqr();
        }

        let mut log_mel = [0.0f64; N_MELS];
        for (m, filter) in filterbank.iter().enumerate() {
            let energy: f64 = filter.iter().map(|&(bin, w)| power[bin] * w).sum();
            log_mel[m] = energy.max(1e-10).ln();
        }

        for (i, slot) in acc.iter_mut().enumerate() {
            *slot += dct_coefficient(&log_mel, i);
        }
        frames += 1;

        start += hop;
    }

    for slot in &mut acc {
        *slot /= frames.max(1) as f64;
    }

    Ok(acc)
}

/// DCT-II projection of the log-mel energies onto coefficient `i`.
fn dct_coefficient(log_mel: &[f64; N_MELS], i: usize) -> f64 {
    log_mel
        .iter()
        .enumerate()
        .map(|(j, &e)| e * (std::f64::consts::PI * i as f64 * (j as f64 + 0.5) / N_MELS as f64).cos())
        .sum()
}

/// Triangular mel filters as sparse (bin, weight) lists.
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<(usize, f64)>> {
    fn hz_to_mel(hz: f64) -> f64 {
        2595.0 * (1.0 + hz / 700.0).log10()
    }
    fn mel_to_hz(mel: f64) -> f64 {
        700.0 * (10f64.powf(mel / 2595.0) - 1.0)
    }

    let n_bins = n_fft / 2 + 1;
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let bin_hz = sample_rate as f64 / n_fft as f64;

    (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (points[m], points[m + 1], points[m + 2]);
            let mut filter = Vec::new();
            for bin in 0..n_bins {
                let f = bin as f64 * bin_hz;
                let weight = if f <= lo || f >= hi {
                    0.0
                } else if f <= center {
                    (f - lo) / (center - lo)
                } else {
                    (hi - f) / (hi - center)
                };
                if weight > 0.0 {
                    filter.push((bin, weight));
                }
            }
            filter
        })
        .collect()
}

/// Choose the number of speakers by silhouette score.
///
/// k = 1 scores 0.0 by definition; k >= 2 uses the silhouette of a 5-restart
/// fit (0.0 when the metric is undefined, e.g. a degenerate single-cluster
/// result). Strict improvement wins, so ties break toward the smallest k.
/// Stops before k reaches the segment count.
fn select_speaker_count(features: &[Vec<f64>], max_speakers: usize) -> usize {
    let mut best_k = 1;
    let mut best_score = -1.0f64;

    for k in 1..=max_speakers {
        if k >= features.len() {
            break;
        }

        let score = if k == 1 {
            0.0
        } else {
            let assignments = kmeans_fit(features, k, 5, KMEANS_SEED);
            silhouette(features, &assignments).unwrap_or(0.0)
        };

        if score > best_score {
            best_score = score;
            best_k = k;
        }
    }

    best_k
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Seeded k-means with restarts; the assignment with the lowest inertia wins.
fn kmeans_fit(features: &[Vec<f64>], k: usize, n_init: usize, seed: u64) -> Vec<usize> {
    let n = features.len();
    if k <= 1 || n <= 1 {
        return vec![0; n];
    }
    let k = k.min(n);

    let mut best_assignments = vec![0; n];
    let mut best_inertia = f64::INFINITY;

    for attempt in 0..n_init {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(attempt as u64));

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let mut centroids: Vec<Vec<f64>> =
            indices[..k].iter().map(|&i| features[i].clone()).collect();

        let mut assignments = vec![0usize; n];
        for _ in 0..100 {
            let mut changed = false;
            for (i, feat) in features.iter().enumerate() {
                let nearest = centroids
                    .iter()
                    .enumerate()
                    .map(|(c, centroid)| (c, euclidean(feat, centroid)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(c, _)| c)
                    .unwrap_or(0);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            let dim = features[0].len();
            let mut sums = vec![vec![0.0f64; dim]; k];
            let mut counts = vec![0usize; k];
            for (i, feat) in features.iter().enumerate() {
                counts[assignments[i]] += 1;
                for (d, &v) in feat.iter().enumerate() {
                    sums[assignments[i]][d] += v;
                }
            }

            for c in 0..k {
                if counts[c] == 0 {
                    // Reseed an emptied cluster with the point farthest from
                    // its current centroid.
                    let farthest = (0..n)
                        .max_by(|&a, &b| {
                            euclidean(&features[a], &centroids[assignments[a]])
                                .total_cmp(&euclidean(&features[b], &centroids[assignments[b]]))
                        })
                        .unwrap_or(0);
                    centroids[c] = features[farthest].clone();
                    assignments[farthest] = c;
                    changed = true;
                } else {
                    for d in 0..dim {
                        centroids[c][d] = sums[c][d] / counts[c] as f64;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        let inertia: f64 = features
            .iter()
            .enumerate()
            .map(|(i, feat)| {
                let d = euclidean(feat, &centroids[assignments[i]]);
                d * d
            })
            .sum();

        if inertia < best_inertia {
            best_inertia = inertia;
            best_assignments = assignments;
        }
    }

    best_assignments
}

/// Mean silhouette over all points. `None` when undefined: fewer than 2
/// points or fewer than 2 distinct clusters in the assignment.
fn silhouette(features: &[Vec<f64>], assignments: &[usize]) -> Option<f64> {
    let n = features.len();
    let mut clusters: Vec<usize> = assignments.to_vec();
    clusters.sort_unstable();
    clusters.dedup();

    if n < 2 || clusters.len() < 2 {
        return None;
    }

    let mut sum = 0.0f64;
    for i in 0..n {
        let ci = assignments[i];

        let mut a_sum = 0.0;
        let mut a_count = 0u64;
        for j in 0..n {
            if j != i && assignments[j] == ci {
                a_sum += euclidean(&features[i], &features[j]);
                a_count += 1;
            }
        }
        let a_i = if a_count > 0 { a_sum / a_count as f64 } else { 0.0 };

        let mut b_i = f64::INFINITY;
        for &cj in &clusters {
            if cj == ci {
                continue;
            }
            let mut b_sum = 0.0;
            let mut b_count = 0u64;
            for j in 0..n {
                if assignments[j] == cj {
                    b_sum += euclidean(&features[i], &features[j]);
                    b_count += 1;
                }
            }
            if b_count > 0 {
                b_i = b_i.min(b_sum / b_count as f64);
            }
        }

        let denom = a_i.max(b_i);
        sum += if denom < 1e-15 { 0.0 } else { (b_i - a_i) / denom };
    }

    Some(sum / n as f64)
}

/// Map raw cluster ids to "SPEAKER 1..K" by order of first occurrence.
fn label_clusters(assignments: &[usize]) -> Vec<String> {
    let mut mapping: Vec<(usize, String)> = Vec::new();
    let mut labels = Vec::with_capacity(assignments.len());

    for &cluster in assignments {
        let label = match mapping.iter().find(|(c, _)| *c == cluster) {
            Some((_, label)) => label.clone(),
            None => {
                let label = format!("SPEAKER {}", mapping.len() + 1);
                mapping.push((cluster, label.clone()));
                label
            }
        };
        labels.push(label);
    }

    labels
}
