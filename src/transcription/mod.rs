//! Transcription: engine invocation plus output normalization.
//!
//! Whatever the engine returns is normalized into a clean list of
//! `(start, end, text)` segments: empty texts dropped, and a single synthetic
//! segment recovered from the full text when the engine yields text but no
//! timestamps. Each run also writes a JSON sidecar with the segments and full
//! text next to the processed waveform.

mod engine;

pub use engine::{TranscriptionEngine, WhisperCppEngine};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One timestamped piece of transcribed speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Raw engine output before normalization.
#[derive(Debug, Clone)]
pub struct TranscriptOutput {
    pub segments: Vec<Segment>,
    pub text: String,
}

/// Wraps a shared engine handle and applies normalization + sidecar writing.
pub struct Transcriber {
    engine: Arc<dyn TranscriptionEngine>,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    segments: &'a [Segment],
    text: &'a str,
}

impl Transcriber {
    pub fn new(engine: Arc<dyn TranscriptionEngine>) -> Self {
        Self { engine }
    }

    /// Transcribe a processed waveform and return normalized segments.
    /// May legitimately return an empty list; the orchestrator decides
    /// whether that is fatal.
    pub async fn transcribe(&self, wav_path: &Path, output_dir: &Path) -> Result<Vec<Segment>> {
        info!(
            "Transcribing {:?} with {} engine",
            wav_path,
            self.engine.name()
        );

        let output = self.engine.transcribe(wav_path).await?;
        let segments = normalize(output.segments, &output.text);

        write_sidecar(wav_path, output_dir, &segments, &output.text)?;

        Ok(segments)
    }
}

fn normalize(raw: Vec<Segment>, full_text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = raw
        .into_iter()
        .filter_map(|s| {
            let text = s.text.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(Segment {
                    start: s.start,
                    end: s.end.max(s.start),
                    text,
                })
            }
        })
        .collect();

    // Engine produced text but no usable timestamps: keep the text as a
    // single zero-length segment rather than losing it.
    if segments.is_empty() && !full_text.trim().is_empty() {
        segments.push(Segment {
            start: 0.0,
            end: 0.0,
            text: full_text.trim().to_string(),
        });
    }

    segments
}

fn write_sidecar(
    wav_path: &Path,
    output_dir: &Path,
    segments: &[Segment],
    text: &str,
) -> Result<()> {
    std::fs::create_dir_all(output_dir).context("Failed to create output directory")?;

    let stem = wav_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("transcript");
    let json_path = output_dir.join(format!("{stem}.json"));

    let sidecar = Sidecar { segments, text };
    let body = serde_json::to_string_pretty(&sidecar).context("Failed to encode sidecar")?;
    std::fs::write(&json_path, body)
        .with_context(|| format!("Failed to write sidecar {:?}", json_path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_normalize_drops_empty_text() {
        let segments = normalize(
            vec![seg(0.0, 1.0, "hello"), seg(1.0, 2.0, "   "), seg(2.0, 3.0, "world")],
            "hello world",
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].text, "world");
    }

    #[test]
    fn test_normalize_recovers_single_segment_from_text() {
        let segments = normalize(vec![], "just plain text");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 0.0);
        assert_eq!(segments[0].text, "just plain text");
    }

    #[test]
    fn test_normalize_empty_everything() {
        assert!(normalize(vec![], "   ").is_empty());
    }

    #[test]
    fn test_normalize_clamps_inverted_timestamps() {
        let segments = normalize(vec![seg(2.0, 1.5, "rewound")], "rewound");
        assert_eq!(segments[0].end, 2.0);
    }

    struct FixedEngine;

    #[async_trait::async_trait]
    impl TranscriptionEngine for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn transcribe(&self, _wav_path: &Path) -> Result<TranscriptOutput> {
            Ok(TranscriptOutput {
                segments: vec![seg(0.0, 1.5, "first"), seg(1.5, 3.0, "second")],
                text: "first second".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_transcribe_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("meeting_mono16k.wav");

        let transcriber = Transcriber::new(Arc::new(FixedEngine));
        let segments = transcriber.transcribe(&wav, dir.path()).await.unwrap();
        assert_eq!(segments.len(), 2);

        let sidecar_path = dir.path().join("meeting_mono16k.json");
        let raw = std::fs::read_to_string(sidecar_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["segments"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["text"], "first second");
    }
}
