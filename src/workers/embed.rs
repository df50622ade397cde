//! Embed worker: computes and stores a vector per chunk.
//!
//! The chunk loop is best-effort: a missing chunk is logged and skipped,
//! and the job still completes. Only a malformed payload or a storage
//! failure marks the job as errored.

use std::sync::Arc;

use serde_json::Value;

use crate::core::config::ConfigService;
use crate::core::errors::ApiError;
use crate::embeddings::{EmbeddingService, DEFAULT_EMBED_DIM};
use crate::queue::{Job, JobKind, JobQueue};
use crate::store::SqliteStore;
use crate::workers::POLL_INTERVAL;

#[derive(Clone)]
pub struct EmbedWorker {
    store: SqliteStore,
    queue: JobQueue,
    embedder: Arc<EmbeddingService>,
    config: ConfigService,
    dim: usize,
}

impl EmbedWorker {
    pub fn new(
        store: SqliteStore,
        queue: JobQueue,
        embedder: Arc<EmbeddingService>,
        config: ConfigService,
    ) -> Self {
        Self {
            store,
            queue,
            embedder,
            config,
            dim: DEFAULT_EMBED_DIM,
        }
    }

    pub fn spawn(self) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(POLL_INTERVAL);
            loop {
                tick.tick().await;
                if let Err(err) = self.poll_once().await {
                    tracing::error!(error = %err, "embed poll failed");
                }
            }
        });
    }

    pub async fn poll_once(&self) -> Result<bool, ApiError> {
        let Some(job) = self.queue.reserve_next().await? else {
            return Ok(false);
        };

        if job.kind() != Some(JobKind::Embed) {
            self.queue.release(&job.job_id).await?;
            return Ok(false);
        }

        match self.process(&job).await {
            Ok(embedded) => {
                tracing::info!(job_id = %job.job_id, embedded, "embed job done");
                self.queue.complete(&job.job_id).await?;
            }
            Err(err) => {
                tracing::error!(job_id = %job.job_id, error = %err, "embed job failed");
                self.queue.fail(&job.job_id, &err.to_string()).await?;
            }
        }
        Ok(true)
    }

    async fn process(&self, job: &Job) -> Result<usize, ApiError> {
        let chunk_ids: Vec<String> = job
            .payload
            .get("chunk_ids")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::BadRequest("embed payload has no chunk_ids".to_string()))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let model = self.resolve_model(&job.payload);
        let mut embedded = 0usize;

        for chunk_id in &chunk_ids {
            let Some(chunk) = self.store.get_chunk(chunk_id).await? else {
                tracing::warn!(chunk_id = %chunk_id, "chunk not found, skipping");
                continue;
            };

            let vector = self.embedder.embed(&chunk.text, self.dim, &model).await;
            self.store
                .upsert_embedding(chunk_id, &chunk.collection_id, &vector, &model)
                .await?;
            embedded += 1;
        }

        Ok(embedded)
    }

    /// Job payload model first, then the configured default (which itself
    /// falls back to the environment and the hard-coded name).
    fn resolve_model(&self, payload: &Value) -> String {
        payload
            .get("model")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_model())
    }
}
