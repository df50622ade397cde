//! End-to-end pipeline test against a temporary database, with the
//! embedding service forced onto its deterministic fallback tier.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use vyre_backend::chunker::ChunkerConfig;
use vyre_backend::core::config::ConfigService;
use vyre_backend::embeddings::{EmbeddingService, DEFAULT_EMBED_DIM};
use vyre_backend::queue::{JobKind, JobQueue};
use vyre_backend::search;
use vyre_backend::store::SqliteStore;
use vyre_backend::workers::embed::EmbedWorker;
use vyre_backend::workers::ingest::IngestWorker;

struct Pipeline {
    _dir: TempDir,
    store: SqliteStore,
    queue: JobQueue,
    embedder: Arc<EmbeddingService>,
    ingest: IngestWorker,
    embed: EmbedWorker,
}

async fn pipeline() -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(&dir.path().join("vyre.db")).await.unwrap();
    let queue = JobQueue::new(&store);
    let embedder = Arc::new(EmbeddingService::new(
        "http://127.0.0.1:1/api/embeddings".to_string(),
        "vyre-no-such-binary".to_string(),
    ));
    let config = ConfigService::new(&dir.path().join("config.json"));

    let ingest = IngestWorker::new(store.clone(), queue.clone(), ChunkerConfig::default());
    let embed = EmbedWorker::new(
        store.clone(),
        queue.clone(),
        embedder.clone(),
        config,
    );

    Pipeline {
        _dir: dir,
        store,
        queue,
        embedder,
        ingest,
        embed,
    }
}

#[tokio::test]
async fn ingest_then_embed_then_search() {
    let p = pipeline().await;

    p.queue
        .enqueue(
            "job_smoke",
            JobKind::Ingest,
            &json!({
                "collection_id": "smoke",
                "text": "Halo Vyre smoke test. Ini kalimat untuk embedding.",
            }),
        )
        .await
        .unwrap();

    // Ingest stage: chunks written, embed job queued.
    assert!(p.ingest.poll_once().await.unwrap());
    assert_eq!(
        p.queue.get("job_smoke").await.unwrap().unwrap().status,
        "done"
    );
    let chunk_count = p.store.chunk_count(Some("smoke")).await.unwrap();
    assert!(chunk_count >= 1);

    // Embed stage: one vector per chunk at the default dimension.
    assert!(p.embed.poll_once().await.unwrap());
    assert_eq!(
        p.store.embedding_count(Some("smoke")).await.unwrap(),
        chunk_count
    );
    let stored = p.store.load_embeddings(Some("smoke")).await.unwrap();
    assert!(stored.iter().all(|e| e.vector.len() == DEFAULT_EMBED_DIM));

    // Search stage: the ingested text is its own best match.
    let query = p
        .embedder
        .embed(
            "Halo Vyre smoke test. Ini kalimat untuk embedding.",
            DEFAULT_EMBED_DIM,
            "gemma3:4b",
        )
        .await;
    let hits = search::search(&p.store, &query, 5, Some("smoke"))
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].score > 0.99);

    let top = p.store.get_chunk(&hits[0].chunk_id).await.unwrap().unwrap();
    assert!(top.text.contains("Halo Vyre"));
}

#[tokio::test]
async fn queue_drains_to_quiet() {
    let p = pipeline().await;

    p.queue
        .enqueue(
            "job_quiet",
            JobKind::Ingest,
            &json!({ "collection_id": "q", "text": "satu kalimat saja" }),
        )
        .await
        .unwrap();

    assert!(p.ingest.poll_once().await.unwrap());
    assert!(p.embed.poll_once().await.unwrap());

    // Both workers now see an empty queue.
    assert!(!p.ingest.poll_once().await.unwrap());
    assert!(!p.embed.poll_once().await.unwrap());
}

#[tokio::test]
async fn search_scopes_to_the_requested_collection() {
    let p = pipeline().await;

    for (job, col, text) in [
        ("job_a", "alpha", "dokumen tentang kucing"),
        ("job_b", "beta", "dokumen tentang anjing"),
    ] {
        p.queue
            .enqueue(
                job,
                JobKind::Ingest,
                &json!({ "collection_id": col, "text": text }),
            )
            .await
            .unwrap();
    }

    // Two ingest cycles, two embed cycles.
    assert!(p.ingest.poll_once().await.unwrap());
    assert!(p.ingest.poll_once().await.unwrap());
    assert!(p.embed.poll_once().await.unwrap());
    assert!(p.embed.poll_once().await.unwrap());

    let query = p
        .embedder
        .embed("dokumen tentang kucing", DEFAULT_EMBED_DIM, "gemma3:4b")
        .await;
    let hits = search::search(&p.store, &query, 5, Some("alpha"))
        .await
        .unwrap();
    assert_eq!(hits.len() as i64, p.store.chunk_count(Some("alpha")).await.unwrap());

    for hit in &hits {
        let chunk = p.store.get_chunk(&hit.chunk_id).await.unwrap().unwrap();
        assert_eq!(chunk.collection_id, "alpha");
    }
}
