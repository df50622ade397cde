use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, config, conversations, health, ingest, jobs, search};
use crate::state::AppState;

/// Thin endpoint layer: every handler parses, delegates to a service and
/// maps `ApiError` to a structured JSON error body.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health::health))
        .route("/ingest", post(ingest::submit_ingest))
        .route("/search", post(search::search_chunks))
        .route("/chat", post(chat::chat))
        .route("/jobs", get(jobs::list_jobs))
        .route("/models", get(config::list_models))
        .route(
            "/config",
            get(config::get_config).post(config::update_config),
        )
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/conversations/:id",
            patch(conversations::update_conversation)
                .delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(conversations::conversation_messages),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}
