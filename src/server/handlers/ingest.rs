use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::queue::JobKind;
use crate::state::AppState;

/// Accepts the raw payload and queues it. The heavy lifting (chunking,
/// embedding) happens in the workers, so the caller gets a 202 right away.
pub async fn submit_ingest(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let has_text = payload
        .get("text")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty());
    let has_attachments = payload
        .get("attachments")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());
    if !has_text && !has_attachments {
        return Err(ApiError::BadRequest(
            "ingest payload has no text or attachments".to_string(),
        ));
    }

    let job_id = new_job_id();
    state.queue.enqueue(&job_id, JobKind::Ingest, &payload).await?;
    tracing::info!(job_id = %job_id, "ingest job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "status": "queued" })),
    ))
}

fn new_job_id() -> String {
    let suffix: u16 = rand::rng().random_range(0..1000);
    format!("job_{}_{}", Utc::now().timestamp_millis(), suffix)
}
