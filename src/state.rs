use std::sync::Arc;

use crate::chat::ChatService;
use crate::core::config::{AppPaths, ConfigService, RuntimeEndpoints};
use crate::embeddings::EmbeddingService;
use crate::llm::ModelCaller;
use crate::queue::JobQueue;
use crate::store::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub store: SqliteStore,
    pub queue: JobQueue,
    pub embedder: Arc<EmbeddingService>,
    pub llm: ModelCaller,
    pub chat: ChatService,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let endpoints = RuntimeEndpoints::from_env();

        let config = ConfigService::new(&paths.settings_path);
        let store = SqliteStore::new(&paths.db_path).await?;
        let queue = JobQueue::new(&store);
        let embedder = Arc::new(EmbeddingService::new(
            endpoints.embed_url.clone(),
            endpoints.model_cmd.clone(),
        ));
        let llm = ModelCaller::new(&endpoints);
        let chat = ChatService::new(
            store.clone(),
            embedder.clone(),
            llm.clone(),
            config.clone(),
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            store,
            queue,
            embedder,
            llm,
            chat,
        }))
    }
}
