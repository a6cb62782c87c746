use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub whisper: WhisperConfig,
    pub ollama: OllamaConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    /// Path to the whisper.cpp CLI binary. Resolved from PATH when unset.
    pub command_path: Option<String>,
    /// Path to the ggml model file.
    pub model_path: Option<String>,
    pub language: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            command_path: None,
            model_path: None,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub embed_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            embed_model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate the extracted mono waveform is resampled to.
    pub target_sample_rate: u32,
    /// Upper bound on the number of speakers diarization may detect.
    pub max_speakers: usize,
    /// Transcript character budget for the summarization prompt.
    pub summary_char_budget: usize,
    /// Keywords taken from the transcript when the summary yields no topics.
    pub fallback_topic_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            max_speakers: 3,
            summary_char_budget: 20_000,
            fallback_topic_count: 8,
        }
    }
}

impl Config {
    /// Load from the config file, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = global::config_file()?;
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        Ok(config)
    }
}
