//! Service wiring and startup.
//!
//! All pipeline dependencies are injected via constructors. The engine, the
//! LLM client, and the vector index are built here once and shared.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::db::Database;
use crate::global;
use crate::index::VectorIndex;
use crate::llm::OllamaClient;
use crate::pipeline::Pipeline;
use crate::transcription::WhisperCppEngine;

pub async fn run_service() -> Result<()> {
    info!("Starting meetscribe service");

    let config = Config::load()?;

    let uploads_dir = global::uploads_dir()?;
    let processed_dir = global::processed_dir()?;
    let index_dir = global::index_dir()?;
    for dir in [&uploads_dir, &processed_dir, &index_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }

    let db = Database::default_location()?;
    // Create the schema up front rather than on first request
    db.open()?;

    let engine = Arc::new(WhisperCppEngine::from_config(&config.whisper)?);
    let ollama = Arc::new(OllamaClient::new(&config.ollama));
    let index = Arc::new(VectorIndex::open(&index_dir, ollama.clone())?);

    let pipeline = Pipeline::new(
        db.clone(),
        uploads_dir.clone(),
        processed_dir,
        engine,
        ollama,
        index.clone(),
        config.pipeline.clone(),
    );

    let state = AppState {
        db,
        pipeline,
        index,
        uploads_dir,
    };

    info!("meetscribe is ready");
    ApiServer::new(config.server.port, state).start().await
}
