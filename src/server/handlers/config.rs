use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    pub default_model: Option<String>,
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "default_model": state.config.default_model() }))
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let model = update
        .default_model
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("no default_model".to_string()))?;

    state.config.set_default_model(&model)?;
    tracing::info!(model = %model, "default model updated");
    Ok(Json(json!({ "ok": true, "default_model": model })))
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let models = state.llm.list_models().await?;
    Ok(Json(json!({ "models": models })))
}
