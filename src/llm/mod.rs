//! LLM summarization: Ollama text generation plus structured response
//! handling.
//!
//! The model is asked for strict JSON with six fields. Models ramble, so the
//! parse is total: any unparseable response degrades to a safe default
//! instead of unwinding, and every field is defaulted when absent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::index::Embedder;

/// Generation calls can legitimately take minutes on local models.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(600);
const EMBED_TIMEOUT: Duration = Duration::from_secs(300);
/// Fallback overview keeps this much of an unparseable response.
const FALLBACK_OVERVIEW_CHARS: usize = 500;

/// External text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Structured meeting summary. All six fields are always present with
/// correct types, whatever the model returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingSummary {
    pub overview: String,
    pub key_topics: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<String>,
    pub risks: Vec<String>,
    pub vibe: String,
}

impl Default for MeetingSummary {
    fn default() -> Self {
        Self {
            overview: String::new(),
            key_topics: Vec::new(),
            decisions: Vec::new(),
            action_items: Vec::new(),
            risks: Vec::new(),
            vibe: "neutral".to_string(),
        }
    }
}

impl MeetingSummary {
    /// Total parse: structured JSON when possible, otherwise a default whose
    /// overview is the head of the raw response. Never fails.
    pub fn parse_or_default(raw: &str) -> Self {
        let trimmed = strip_code_fences(raw.trim());

        match serde_json::from_str::<MeetingSummary>(trimmed) {
            Ok(mut summary) => {
                if summary.vibe.trim().is_empty() {
                    summary.vibe = "neutral".to_string();
                }
                summary
            }
            Err(e) => {
                warn!("Summary response was not valid JSON ({}), using fallback", e);
                Self {
                    overview: raw.chars().take(FALLBACK_OVERVIEW_CHARS).collect(),
                    ..Self::default()
                }
            }
        }
    }
}

/// Models ignore "no code fences" often enough to be worth handling.
fn strip_code_fences(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    // Drop the fence line (may carry a language tag) and the closing fence.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim().strip_suffix("```").unwrap_or(body).trim()
}

/// Build the summarization prompt, clipping the transcript to the budget.
pub fn summary_prompt(transcript: &str, char_budget: usize) -> String {
    let clipped: String = transcript.chars().take(char_budget).collect();

    format!(
        "You are a helpful meeting analyst. Given a transcript, produce STRICT JSON with keys: \
         overview (string), key_topics (string[]), decisions (string[]), action_items (string[]), \
         risks (string[]), vibe (string). Be concise and use short bullet-like strings.\n\n\
         TRANSCRIPT:\n{clipped}\n\n\
         Return STRICT JSON only, no commentary, no code fences."
    )
}

/// Summarize a flattened transcript through the given generator.
pub async fn summarize_and_extract(
    generator: &dyn TextGenerator,
    transcript: &str,
    char_budget: usize,
) -> Result<MeetingSummary> {
    let prompt = summary_prompt(transcript, char_budget);
    let response = generator.generate(&prompt).await?;

    debug!("Summarization response: {} chars", response.len());
    Ok(MeetingSummary::parse_or_default(&response))
}

/// Ollama HTTP client: text generation and embeddings.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(GENERATE_TIMEOUT)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .with_context(|| format!("Cannot reach Ollama at {}", self.base_url))?
            .error_for_status()
            .context("Ollama generate returned an error status")?;

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama generate response")?;

        Ok(body.response.trim().to_string())
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(EMBED_TIMEOUT)
            .json(&EmbeddingsRequest {
                model: &self.embed_model,
                prompt: text,
            })
            .send()
            .await
            .with_context(|| format!("Cannot reach Ollama at {}", self.base_url))?
            .error_for_status()
            .context("Ollama embeddings returned an error status")?;

        let body: EmbeddingsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama embeddings response")?;

        Ok(body.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_json() {
        let raw = r#"{
            "overview": "Team discussed Q3 goals",
            "key_topics": ["goals", "budget"],
            "decisions": ["ship in October"],
            "action_items": ["update roadmap"],
            "risks": ["vendor delay"],
            "vibe": "upbeat"
        }"#;

        let summary = MeetingSummary::parse_or_default(raw);
        assert_eq!(summary.overview, "Team discussed Q3 goals");
        assert_eq!(summary.key_topics, vec!["goals", "budget"]);
        assert_eq!(summary.vibe, "upbeat");
    }

    #[test]
    fn test_parse_partial_json_fills_defaults() {
        let summary = MeetingSummary::parse_or_default(r#"{"overview": "short one"}"#);
        assert_eq!(summary.overview, "short one");
        assert!(summary.key_topics.is_empty());
        assert!(summary.risks.is_empty());
        assert_eq!(summary.vibe, "neutral");
    }

    #[test]
    fn test_parse_garbage_falls_back() {
        let raw = "Sure! Here's a summary of the meeting: everyone agreed it went well.";
        let summary = MeetingSummary::parse_or_default(raw);
        assert!(summary.overview.starts_with("Sure!"));
        assert!(summary.key_topics.is_empty());
        assert!(summary.decisions.is_empty());
        assert!(summary.action_items.is_empty());
        assert!(summary.risks.is_empty());
        assert_eq!(summary.vibe, "neutral");
    }

    #[test]
    fn test_parse_fallback_clips_overview() {
        let raw = "x".repeat(2000);
        let summary = MeetingSummary::parse_or_default(&raw);
        assert_eq!(summary.overview.chars().count(), 500);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"overview\": \"fenced\", \"vibe\": \"calm\"}\n```";
        let summary = MeetingSummary::parse_or_default(raw);
        assert_eq!(summary.overview, "fenced");
        assert_eq!(summary.vibe, "calm");
    }

    #[test]
    fn test_parse_empty_string() {
        let summary = MeetingSummary::parse_or_default("");
        assert_eq!(summary.overview, "");
        assert_eq!(summary.vibe, "neutral");
    }

    #[test]
    fn test_parse_wrong_types_falls_back() {
        // key_topics as a string, not a list: whole parse degrades safely
        let raw = r#"{"overview": "ok", "key_topics": "budget"}"#;
        let summary = MeetingSummary::parse_or_default(raw);
        assert!(summary.key_topics.is_empty());
        assert!(summary.overview.starts_with("{"));
    }

    #[test]
    fn test_prompt_clips_transcript() {
        let transcript = "word ".repeat(10_000);
        let prompt = summary_prompt(&transcript, 100);
        assert!(prompt.len() < transcript.len());
        assert!(prompt.contains("STRICT JSON"));
    }
}
