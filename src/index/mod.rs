//! Semantic vector index over transcript segments.
//!
//! Embeddings come from an injected [`Embedder`]; the index itself is a
//! local store persisted as JSON under the index directory. Items are keyed
//! by the composite identity `"{meeting_id}:{segment_id}"`, so re-indexing a
//! meeting replaces its previous entries. Scores are `1 - distance` from the
//! nearest-neighbor ranking, higher meaning more similar.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const INDEX_FILE: &str = "segments.json";

/// External embedding service. One text per call; no batching.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    meeting_id: i64,
    meeting_title: String,
    segment_id: i64,
    text: String,
    embedding: Vec<f32>,
}

/// One search result, carrying enough metadata to reconstruct the hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub meeting_id: i64,
    pub meeting_title: String,
    pub segment_id: i64,
    pub text: String,
    pub score: f32,
}

pub struct VectorIndex {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    entries: Mutex<Vec<IndexEntry>>,
}

impl VectorIndex {
    /// Open (or create) the index persisted under `dir`.
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(dir).context("Failed to create index directory")?;
        let path = dir.join(INDEX_FILE);

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read index {:?}", path))?;
            serde_json::from_str(&raw).context("Failed to parse index file")?
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            embedder,
            entries: Mutex::new(entries),
        })
    }

    /// Embed and upsert one meeting's segments, replacing any previous
    /// entries with the same composite ids.
    pub async fn upsert_meeting_segments(
        &self,
        meeting_id: i64,
        meeting_title: &str,
        segments: &[(i64, String)],
    ) -> Result<()> {
        let mut new_entries = Vec::with_capacity(segments.len());
        for (segment_id, text) in segments {
            let embedding = self.embedder.embed(text).await?;
            if embedding.is_empty() {
                warn!("Empty embedding for segment {segment_id}, skipping");
                continue;
            }
            new_entries.push(IndexEntry {
                id: format!("{meeting_id}:{segment_id}"),
                meeting_id,
                meeting_title: meeting_title.to_string(),
                segment_id: *segment_id,
                text: text.clone(),
                embedding,
            });
        }

        let mut entries = self.entries.lock().await;
        for new_entry in new_entries {
            entries.retain(|e| e.id != new_entry.id);
            entries.push(new_entry);
        }
        self.persist(&entries)?;

        info!(
            "Vector index now holds {} entries after upserting meeting {}",
            entries.len(),
            meeting_id
        );
        Ok(())
    }

    /// Nearest-neighbor search. A failed query embedding yields an empty
    /// result set rather than an error.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(embedding) if !embedding.is_empty() => embedding,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!("Query embedding failed: {:#}", e);
                return Vec::new();
            }
        };

        let entries = self.entries.lock().await;
        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|entry| {
                let distance = 1.0 - cosine_similarity(&query_embedding, &entry.embedding);
                SearchHit {
                    meeting_id: entry.meeting_id,
                    meeting_title: entry.meeting_title.clone(),
                    segment_id: entry.segment_id,
                    text: entry.text.clone(),
                    score: 1.0 - distance,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }

    fn persist(&self, entries: &[IndexEntry]) -> Result<()> {
        let body = serde_json::to_string(entries).context("Failed to encode index")?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("Failed to write index {:?}", self.path))?;
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a < 1e-10 || mag_b < 1e-10 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
