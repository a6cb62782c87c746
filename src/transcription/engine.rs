//! Speech-to-text engine interface and the whisper.cpp CLI implementation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::config::WhisperConfig;

use super::{Segment, TranscriptOutput};

/// External speech-to-text engine. Inference may be stateful, so callers must
/// serialize access; the orchestrator holds a mutex across the transcribe
/// stage.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, wav_path: &Path) -> Result<TranscriptOutput>;
}

/// whisper.cpp CLI engine with JSON output parsing.
pub struct WhisperCppEngine {
    command: PathBuf,
    model: PathBuf,
    language: String,
}

impl WhisperCppEngine {
    pub fn from_config(config: &WhisperConfig) -> Result<Self> {
        let command = match &config.command_path {
            Some(path) => PathBuf::from(path),
            None => which::which("whisper-cli")
                .context("whisper-cli not found in PATH; set whisper.command_path")?,
        };

        let model = config
            .model_path
            .as_ref()
            .map(PathBuf::from)
            .context("whisper.model_path is required")?;

        Ok(Self {
            command,
            model,
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCppEngine {
    fn name(&self) -> &'static str {
        "whisper-cpp"
    }

    async fn transcribe(&self, wav_path: &Path) -> Result<TranscriptOutput> {
        let command = self.command.clone();
        let model = self.model.clone();
        let language = self.language.clone();
        let wav_path = wav_path.to_path_buf();

        tokio::task::spawn_blocking(move || run_whisper_cli(&command, &model, &language, &wav_path))
            .await
            .context("Transcription task panicked")?
    }
}

fn run_whisper_cli(
    command: &Path,
    model: &Path,
    language: &str,
    wav_path: &Path,
) -> Result<TranscriptOutput> {
    let output_base = wav_path.with_extension("");

    let output = Command::new(command)
        .arg("-m")
        .arg(model)
        .arg("-f")
        .arg(wav_path)
        .args(["-l", language])
        .arg("-oj")
        .arg("-of")
        .arg(&output_base)
        .output()
        .with_context(|| format!("Failed to run {:?}", command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("whisper.cpp failed: {}", stderr.trim());
    }

    let json_path = output_base.with_extension("json");
    let raw = std::fs::read_to_string(&json_path)
        .with_context(|| format!("whisper.cpp produced no JSON at {:?}", json_path))?;
    let parsed: WhisperJson =
        serde_json::from_str(&raw).context("Failed to parse whisper.cpp JSON output")?;

    debug!(
        "whisper.cpp returned {} raw segments for {:?}",
        parsed.transcription.len(),
        wav_path
    );

    let segments: Vec<Segment> = parsed
        .transcription
        .iter()
        .map(|s| Segment {
            start: s.offsets.from as f64 / 1000.0,
            end: s.offsets.to as f64 / 1000.0,
            text: s.text.trim().to_string(),
        })
        .collect();

    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(TranscriptOutput { segments, text })
}

#[derive(Debug, Deserialize)]
struct WhisperJson {
    #[serde(default)]
    transcription: Vec<WhisperJsonSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperJsonSegment {
    offsets: WhisperJsonOffsets,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperJsonOffsets {
    from: u64,
    to: u64,
}
