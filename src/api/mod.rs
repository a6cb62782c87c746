//! REST API server.
//!
//! Provides HTTP endpoints for:
//! - Uploading meeting recordings (POST /upload)
//! - Starting pipeline runs (POST /meetings/:id/process)
//! - Processing status (GET /meetings/:id/status)
//! - Meetings with tags and summaries inlined (GET /meetings)
//! - Segments / summary / topic-graph reads
//! - Semantic search (GET /search)

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

use crate::db::Database;
use crate::index::VectorIndex;
use crate::pipeline::Pipeline;

/// Recordings can be long; cap uploads at 1 GiB rather than axum's default.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub pipeline: Arc<Pipeline>,
    pub index: Arc<VectorIndex>,
    pub uploads_dir: PathBuf,
}

pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .merge(routes::meetings::router(self.state.clone()))
            .merge(routes::search::router(self.state))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  POST /upload                 - Upload a meeting recording");
        info!("  POST /meetings/:id/process   - Start or force a pipeline run");
        info!("  GET  /meetings/:id/status    - Processing status");
        info!("  GET  /meetings               - List meetings with tags and summary");
        info!("  GET  /meetings/:id/segments  - Transcript segments");
        info!("  GET  /meetings/:id/summary   - Structured summary");
        info!("  GET  /meetings/:id/graph     - Topic co-occurrence graph");
        info!("  GET  /search?q=&top_k=       - Semantic segment search");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetscribe",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "meetscribe"
    }))
}
