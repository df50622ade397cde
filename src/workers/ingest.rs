//! Ingest worker: turns submitted text into documents and chunks, then
//! hands the chunks to the embed stage.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::chunker::ChunkerConfig;
use crate::core::errors::ApiError;
use crate::queue::{Job, JobKind, JobQueue};
use crate::store::{Chunk, Document, SqliteStore};
use crate::workers::POLL_INTERVAL;

struct SourceUnit {
    filename: String,
    mime: String,
    source: String,
    text: String,
}

#[derive(Clone)]
pub struct IngestWorker {
    store: SqliteStore,
    queue: JobQueue,
    chunker: ChunkerConfig,
}

impl IngestWorker {
    pub fn new(store: SqliteStore, queue: JobQueue, chunker: ChunkerConfig) -> Self {
        Self {
            store,
            queue,
            chunker,
        }
    }

    pub fn spawn(self) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(POLL_INTERVAL);
            loop {
                tick.tick().await;
                if let Err(err) = self.poll_once().await {
                    tracing::error!(error = %err, "ingest poll failed");
                }
            }
        });
    }

    /// One poll cycle. Returns whether an ingest job was handled. Jobs of
    /// another kind are put back for their own worker.
    pub async fn poll_once(&self) -> Result<bool, ApiError> {
        let Some(job) = self.queue.reserve_next().await? else {
            return Ok(false);
        };

        if job.kind() != Some(JobKind::Ingest) {
            self.queue.release(&job.job_id).await?;
            return Ok(false);
        }

        match self.process(&job).await {
            Ok(chunk_total) => {
                tracing::info!(job_id = %job.job_id, chunks = chunk_total, "ingest job done");
                self.queue.complete(&job.job_id).await?;
            }
            Err(err) => {
                tracing::error!(job_id = %job.job_id, error = %err, "ingest job failed");
                self.queue.fail(&job.job_id, &err.to_string()).await?;
            }
        }
        Ok(true)
    }

    async fn process(&self, job: &Job) -> Result<usize, ApiError> {
        let collection_id = job
            .payload
            .get("collection_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let model_hint = job
            .payload
            .get("options")
            .and_then(|o| o.get("model"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let units = source_units(&job.payload)?;
        let mut chunk_total = 0usize;

        for unit in units {
            let doc_id = format!("doc_{}", Uuid::new_v4());
            self.store
                .insert_document(&Document {
                    doc_id: doc_id.clone(),
                    collection_id: collection_id.clone(),
                    filename: unit.filename,
                    mime: unit.mime,
                    source: unit.source,
                    size: unit.text.chars().count() as i64,
                    metadata: json!({}),
                })
                .await?;

            let spans = self.chunker.split(&unit.text);
            let chunks: Vec<Chunk> = spans
                .into_iter()
                .enumerate()
                .map(|(index, span)| Chunk {
                    chunk_id: format!("chunk_{}", Uuid::new_v4()),
                    doc_id: doc_id.clone(),
                    collection_id: collection_id.clone(),
                    tokens: token_estimate(&span.text),
                    start_pos: span.start as i64,
                    end_pos: span.end as i64,
                    text: span.text,
                    metadata: json!({ "chunk_index": index }),
                })
                .collect();
            self.store.insert_chunks(&chunks).await?;

            if chunks.is_empty() {
                continue;
            }
            chunk_total += chunks.len();

            let chunk_ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
            let mut payload = json!({
                "collection_id": collection_id,
                "chunk_ids": chunk_ids,
            });
            if let Some(model) = &model_hint {
                payload["model"] = json!(model);
            }

            let embed_job_id = format!("embed_{}", Uuid::new_v4());
            self.queue
                .enqueue(&embed_job_id, JobKind::Embed, &payload)
                .await?;
        }

        Ok(chunk_total)
    }
}

/// One unit per attachment (pre-extracted text), plus one for inline text.
fn source_units(payload: &Value) -> Result<Vec<SourceUnit>, ApiError> {
    let mut units = Vec::new();

    if let Some(attachments) = payload.get("attachments").and_then(Value::as_array) {
        for attachment in attachments {
            let text = attachment
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("");
            if text.is_empty() {
                tracing::warn!("attachment without extracted text, skipping");
                continue;
            }
            units.push(SourceUnit {
                filename: attachment
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("attachment")
                    .to_string(),
                mime: attachment
                    .get("mime")
                    .and_then(Value::as_str)
                    .unwrap_or("text/plain")
                    .to_string(),
                source: "attachment".to_string(),
                text: text.to_string(),
            });
        }
    }

    if let Some(text) = payload.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            units.push(SourceUnit {
                filename: "inline.txt".to_string(),
                mime: "text/plain".to_string(),
                source: "inline".to_string(),
                text: text.to_string(),
            });
        }
    }

    if units.is_empty() {
        return Err(ApiError::BadRequest(
            "ingest payload has no text or attachments".to_string(),
        ));
    }
    Ok(units)
}

fn token_estimate(text: &str) -> i64 {
    (text.chars().count() as i64 + 3) / 4
}
