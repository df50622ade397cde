use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.store.list_conversations().await?;
    Ok(Json(json!({ "conversations": conversations })))
}

pub async fn conversation_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.store.conversation_messages(&conversation_id).await?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct ConversationUpdate {
    pub title: Option<String>,
}

pub async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(update): Json<ConversationUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let title = update
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("no title".to_string()))?;

    let updated = state
        .store
        .rename_conversation(&conversation_id, &title)
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!(
            "conversation {} not found",
            conversation_id
        )));
    }
    Ok(Json(json!({ "ok": true, "title": title })))
}

pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.store.delete_conversation(&conversation_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "conversation {} not found",
            conversation_id
        )));
    }
    Ok(Json(json!({ "ok": true })))
}
