use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::embeddings::DEFAULT_EMBED_DIM;
use crate::search;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(alias = "query")]
    pub text: Option<String>,
    pub collection_id: Option<String>,
    pub top_k: Option<usize>,
}

pub async fn search_chunks(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = request.text.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest("no search text".to_string()));
    }

    let model = state.config.default_model();
    let query = state.embedder.embed(&text, DEFAULT_EMBED_DIM, &model).await;
    let hits = search::search(
        &state.store,
        &query,
        search::resolve_top_k(request.top_k),
        request.collection_id.as_deref(),
    )
    .await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let text = state
            .store
            .get_chunk(&hit.chunk_id)
            .await?
            .map(|chunk| chunk.text)
            .unwrap_or_default();
        results.push(json!({
            "chunk_id": hit.chunk_id,
            "score": hit.score,
            "text": text,
        }));
    }

    Ok(Json(json!({ "results": results })))
}
