//! Semantic search endpoint: index hits re-joined against stored segments
//! for exact timestamps.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::SegmentRepository;

const DEFAULT_TOP_K: usize = 8;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub top_k: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", get(search))
        .with_state(state)
}

async fn search(
    Query(params): Query<SearchParams>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let top_k = params.top_k.unwrap_or(DEFAULT_TOP_K);
    let hits = state.index.search(&params.q, top_k).await;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Value>> {
        let conn = db.open()?;
        let mut rows = Vec::with_capacity(hits.len());
        for hit in hits {
            // Index entries whose segment row no longer exists are dropped
            let Some(segment) = SegmentRepository::get(&conn, hit.segment_id)? else {
                continue;
            };
            rows.push(json!({
                "meeting_id": hit.meeting_id,
                "meeting_title": hit.meeting_title,
                "segment_id": hit.segment_id,
                "start": segment.start,
                "end": segment.end,
                "text": hit.text,
                "score": hit.score,
            }));
        }
        Ok(rows)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Search task panicked: {e}")))?
    .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(Value::Array(rows)))
}
