//! Meeting endpoints: upload, processing control, and reads over the
//! persisted entities.

use axum::{
    extract::{Multipart, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::{MeetingRepository, SegmentRepository, SummaryRepository, TagRepository};
use crate::error::PipelineError;
use crate::topics;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload_meeting))
        .route("/meetings", get(list_meetings))
        .route("/meetings/:id/process", post(process_meeting))
        .route("/meetings/:id/status", get(processing_status))
        .route("/meetings/:id/segments", get(get_segments))
        .route("/meetings/:id/summary", get(get_summary))
        .route("/meetings/:id/graph", get(get_graph))
        .with_state(state)
}

async fn upload_meeting(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "recording".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;

        let stored_name = format!(
            "{}_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            original
        );
        let title = std::path::Path::new(&original)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&original)
            .to_string();

        let dest = state.uploads_dir.join(&stored_name);
        let db = state.db.clone();
        let stored = stored_name.clone();
        let meeting_id = tokio::task::spawn_blocking(move || -> anyhow::Result<i64> {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, &data)?;

            let conn = db.open()?;
            MeetingRepository::insert(&conn, &title, &stored)
        })
        .await
        .map_err(|e| ApiError::internal(format!("Upload task panicked: {e}")))?
        .map_err(|e| ApiError::internal(e.to_string()))?;

        info!("Stored upload {} as meeting {}", stored_name, meeting_id);

        return Ok(Json(json!({
            "meeting_id": meeting_id,
            "filename": stored_name,
        })));
    }

    Err(ApiError::bad_request("Missing 'file' field in upload"))
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub force: bool,
}

async fn process_meeting(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    body: Option<Json<ProcessRequest>>,
) -> ApiResult<Json<Value>> {
    let force = body.map(|Json(req)| req.force).unwrap_or(false);

    match state.pipeline.process(id, force).await {
        Ok(outcome) => Ok(Json(json!({
            "status": outcome.as_str(),
            "meeting_id": id,
        }))),
        Err(PipelineError::NotFound(_)) => Err(ApiError::not_found("Meeting not found")),
        Err(e) => {
            error!("Failed to start processing for meeting {}: {:#}", id, e);
            Err(ApiError::internal(e.to_string()))
        }
    }
}

async fn processing_status(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        MeetingRepository::get(&conn, id)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Status task panicked: {e}")))?
    .map_err(|e| ApiError::internal(e.to_string()))?
    .ok_or_else(|| ApiError::not_found("Meeting not found"))?;

    Ok(Json(json!({
        "meeting_id": meeting.id,
        "status": meeting.status,
        "error_message": meeting.error_message,
    })))
}

async fn list_meetings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let entries = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Value>> {
        let conn = db.open()?;
        let meetings = MeetingRepository::list(&conn)?;

        let mut out = Vec::with_capacity(meetings.len());
        for m in meetings {
            let tags = TagRepository::list_for_meeting(&conn, m.id)?;
            let summary = SummaryRepository::get_for_meeting(&conn, m.id)?
                .map(|record| serde_json::to_value(record.decode()))
                .transpose()?;

            out.push(json!({
                "id": m.id,
                "title": m.title,
                "filename": m.filename,
                "duration_sec": m.duration_sec,
                "created_at": m.created_at,
                "tags": tags,
                "summary": summary,
                "status": m.status,
                "error_message": m.error_message,
            }));
        }
        Ok(out)
    })
    .await
    .map_err(|e| ApiError::internal(format!("List task panicked: {e}")))?
    .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(Value::Array(entries)))
}

async fn get_segments(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let segments = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        SegmentRepository::list_for_meeting(&conn, id)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Segments task panicked: {e}")))?
    .map_err(|e| ApiError::internal(e.to_string()))?;

    let rows: Vec<Value> = segments
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "start": s.start,
                "end": s.end,
                "text": s.text,
                "speaker": s.speaker.as_deref().unwrap_or("SPEAKER"),
                "sentiment": s.sentiment.unwrap_or(0.0),
            })
        })
        .collect();

    Ok(Json(Value::Array(rows)))
}

async fn get_summary(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        SummaryRepository::get_for_meeting(&conn, id)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Summary task panicked: {e}")))?
    .map_err(|e| ApiError::internal(e.to_string()))?;

    match summary {
        Some(record) => {
            let decoded = serde_json::to_value(record.decode())
                .map_err(|e| ApiError::internal(e.to_string()))?;
            Ok(Json(decoded))
        }
        None => Ok(Json(Value::Null)),
    }
}

async fn get_graph(Path(id): Path<i64>, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let (topic_names, segment_texts) =
        tokio::task::spawn_blocking(move || -> anyhow::Result<(Vec<String>, Vec<String>)> {
            let conn = db.open()?;
            let topic_names = SummaryRepository::get_for_meeting(&conn, id)?
                .map(|record| record.decode().key_topics)
                .unwrap_or_default();
            let segment_texts = SegmentRepository::list_for_meeting(&conn, id)?
                .into_iter()
                .map(|s| s.text)
                .collect();
            Ok((topic_names, segment_texts))
        })
        .await
        .map_err(|e| ApiError::internal(format!("Graph task panicked: {e}")))?
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let graph = topics::build_topic_graph(&topic_names, &segment_texts);
    let value = serde_json::to_value(graph).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(value))
}
