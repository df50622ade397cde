use std::env;

use anyhow::Context;
use tokio::net::TcpListener;

use vyre_backend::chunker::ChunkerConfig;
use vyre_backend::server::router;
use vyre_backend::state::AppState;
use vyre_backend::workers::embed::EmbedWorker;
use vyre_backend::workers::ingest::IngestWorker;
use vyre_backend::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths.log_dir);

    IngestWorker::new(
        state.store.clone(),
        state.queue.clone(),
        ChunkerConfig::default(),
    )
    .spawn();
    EmbedWorker::new(
        state.store.clone(),
        state.queue.clone(),
        state.embedder.clone(),
        state.config.clone(),
    )
    .spawn();

    let port = env::var("PORT")
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(8080);
    let bind_addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "listening");

    let app = router::router(state);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
