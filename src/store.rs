//! SQLite-backed store for documents, chunks, embeddings and chat history.
//!
//! Single source of truth for the pipeline: workers are stateless between
//! polls and derive all context from these rows. Vectors are stored as
//! little-endian f32 blobs next to their chunk ids, and similarity search
//! is a brute-force scan over them (see `search`).

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

const SCHEMA_VERSION: i64 = 1;

pub(crate) fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub collection_id: String,
    pub filename: String,
    pub mime: String,
    pub source: String,
    pub size: i64,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub collection_id: String,
    pub text: String,
    pub start_pos: i64,
    pub end_pos: i64,
    pub tokens: i64,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub chunk_id: String,
    pub collection_id: String,
    pub vector: Vec<f32>,
    pub dim: i64,
    pub model: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationInfo {
    pub conversation_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &Path) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT UNIQUE NOT NULL,
                type TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'queued'
                    CHECK(status IN ('queued', 'running', 'done', 'error')),
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                lease_expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_jobs_status_created
                ON jobs(status, created_at, id)",
            "CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                collection_id TEXT NOT NULL DEFAULT '',
                filename TEXT NOT NULL DEFAULT '',
                mime TEXT NOT NULL DEFAULT 'text/plain',
                source TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL REFERENCES documents(doc_id),
                collection_id TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL,
                start_pos INTEGER NOT NULL,
                end_pos INTEGER NOT NULL,
                tokens INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                CHECK(start_pos < end_pos)
            )",
            "CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection_id)",
            "CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id TEXT NOT NULL REFERENCES chunks(chunk_id),
                collection_id TEXT NOT NULL DEFAULT '',
                vector BLOB NOT NULL,
                dim INTEGER NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(chunk_id, model)
            )",
            "CREATE INDEX IF NOT EXISTS idx_embeddings_collection
                ON embeddings(collection_id)",
            "CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL
                    REFERENCES conversations(conversation_id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        }

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<(), ApiError> {
        let metadata = serde_json::to_string(&doc.metadata).map_err(ApiError::internal)?;
        sqlx::query(
            "INSERT INTO documents (doc_id, collection_id, filename, mime, source, size, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&doc.doc_id)
        .bind(&doc.collection_id)
        .bind(&doc.filename)
        .bind(&doc.mime)
        .bind(&doc.source)
        .bind(doc.size)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), ApiError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for chunk in chunks {
            let metadata = serde_json::to_string(&chunk.metadata).map_err(ApiError::internal)?;
            sqlx::query(
                "INSERT INTO chunks
                     (chunk_id, doc_id, collection_id, text, start_pos, end_pos, tokens, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.doc_id)
            .bind(&chunk.collection_id)
            .bind(&chunk.text)
            .bind(chunk.start_pos)
            .bind(chunk.end_pos)
            .bind(chunk.tokens)
            .bind(metadata)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>, ApiError> {
        let row = sqlx::query(
            "SELECT chunk_id, doc_id, collection_id, text, start_pos, end_pos, tokens, metadata
             FROM chunks WHERE chunk_id = ?1",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.map(chunk_from_row).transpose().map_err(ApiError::internal)
    }

    pub async fn chunk_count(&self, collection_id: Option<&str>) -> Result<i64, ApiError> {
        let count: i64 = if let Some(collection_id) = collection_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection_id = ?1")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };
        Ok(count)
    }

    /// Re-embedding a chunk under the same model replaces the row; a new
    /// model appends alongside the old vectors.
    pub async fn upsert_embedding(
        &self,
        chunk_id: &str,
        collection_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<(), ApiError> {
        let blob = serialize_vector(vector);
        sqlx::query(
            "INSERT OR REPLACE INTO embeddings (chunk_id, collection_id, vector, dim, model)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(chunk_id)
        .bind(collection_id)
        .bind(blob)
        .bind(vector.len() as i64)
        .bind(model)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn load_embeddings(
        &self,
        collection_id: Option<&str>,
    ) -> Result<Vec<StoredEmbedding>, ApiError> {
        let rows = if let Some(collection_id) = collection_id {
            sqlx::query(
                "SELECT chunk_id, collection_id, vector, dim, model
                 FROM embeddings WHERE collection_id = ?1 ORDER BY rowid",
            )
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "SELECT chunk_id, collection_id, vector, dim, model
                 FROM embeddings ORDER BY rowid",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        rows.into_iter()
            .map(embedding_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn embedding_count(&self, collection_id: Option<&str>) -> Result<i64, ApiError> {
        let count: i64 = if let Some(collection_id) = collection_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE collection_id = ?1")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };
        Ok(count)
    }

    pub async fn ensure_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        sqlx::query("INSERT OR IGNORE INTO conversations (conversation_id) VALUES (?1)")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<String, ApiError> {
        let message_id = format!("msg_{}", uuid::Uuid::new_v4());
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO conversations (conversation_id) VALUES (?1)")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO messages (message_id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&message_id)
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(now_iso())
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "UPDATE conversations SET updated_at = ?1 WHERE conversation_id = ?2",
        )
        .bind(now_iso())
        .bind(conversation_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(message_id)
    }

    /// Last `limit` turns in chronological order.
    pub async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT message_id, role, content, created_at
             FROM (
                 SELECT rowid, message_id, role, content, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY rowid DESC
                 LIMIT ?2
             )
             ORDER BY rowid ASC",
        )
        .bind(conversation_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT conversation_id, title, created_at, updated_at
             FROM conversations ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(|row| {
                Ok(ConversationInfo {
                    conversation_id: row.try_get("conversation_id")?,
                    title: row.try_get("title")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::internal)
    }

    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT message_id, role, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    /// Returns false when the conversation does not exist.
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE conversation_id = ?3",
        )
        .bind(title)
        .bind(now_iso())
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM conversations WHERE conversation_id = ?1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn serialize_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Chunk, sqlx::Error> {
    let metadata_raw: String = row.try_get("metadata")?;
    let metadata = serde_json::from_str(&metadata_raw)
        .unwrap_or(Value::Object(serde_json::Map::new()));

    Ok(Chunk {
        chunk_id: row.try_get("chunk_id")?,
        doc_id: row.try_get("doc_id")?,
        collection_id: row.try_get("collection_id")?,
        text: row.try_get("text")?,
        start_pos: row.try_get("start_pos")?,
        end_pos: row.try_get("end_pos")?,
        tokens: row.try_get("tokens")?,
        metadata,
    })
}

fn embedding_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredEmbedding, sqlx::Error> {
    let blob: Vec<u8> = row.try_get("vector")?;
    Ok(StoredEmbedding {
        chunk_id: row.try_get("chunk_id")?,
        collection_id: row.try_get("collection_id")?,
        vector: deserialize_vector(&blob),
        dim: row.try_get("dim")?,
        model: row.try_get("model")?,
    })
}

fn message_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredMessage, sqlx::Error> {
    Ok(StoredMessage {
        message_id: row.try_get("message_id")?,
        role: row.try_get("role")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) async fn test_store() -> SqliteStore {
        let dir = std::env::temp_dir().join(format!("vyre-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        SqliteStore::new(&dir.join("vyre.db")).await.unwrap()
    }

    pub(crate) fn test_document(doc_id: &str, collection_id: &str) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            collection_id: collection_id.to_string(),
            filename: "inline.txt".to_string(),
            mime: "text/plain".to_string(),
            source: "inline".to_string(),
            size: 0,
            metadata: json!({}),
        }
    }

    pub(crate) fn test_chunk(chunk_id: &str, doc_id: &str, collection_id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: chunk_id.to_string(),
            doc_id: doc_id.to_string(),
            collection_id: collection_id.to_string(),
            text: text.to_string(),
            start_pos: 0,
            end_pos: text.chars().count().max(1) as i64,
            tokens: 1,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn vector_blob_round_trip() {
        let vector = vec![1.0f32, -0.5, 0.25, 3.5];
        let blob = serialize_vector(&vector);
        assert_eq!(blob.len(), 16);
        assert_eq!(deserialize_vector(&blob), vector);
    }

    #[tokio::test]
    async fn documents_chunks_and_embeddings_persist() {
        let store = test_store().await;

        store.insert_document(&test_document("d1", "c1")).await.unwrap();
        store
            .insert_chunks(&[
                test_chunk("k1", "d1", "c1", "first chunk"),
                test_chunk("k2", "d1", "c1", "second chunk"),
            ])
            .await
            .unwrap();

        assert_eq!(store.chunk_count(Some("c1")).await.unwrap(), 2);
        let chunk = store.get_chunk("k2").await.unwrap().unwrap();
        assert_eq!(chunk.text, "second chunk");
        assert!(store.get_chunk("missing").await.unwrap().is_none());

        store
            .upsert_embedding("k1", "c1", &[1.0, 0.0], "test-model")
            .await
            .unwrap();
        store
            .upsert_embedding("k1", "c1", &[0.0, 1.0], "test-model")
            .await
            .unwrap();
        assert_eq!(store.embedding_count(Some("c1")).await.unwrap(), 1);

        // Different model appends instead of replacing.
        store
            .upsert_embedding("k1", "c1", &[0.5, 0.5], "other-model")
            .await
            .unwrap();
        assert_eq!(store.embedding_count(Some("c1")).await.unwrap(), 2);

        let stored = store.load_embeddings(Some("c1")).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].dim as usize, stored[0].vector.len());
    }

    #[tokio::test]
    async fn conversation_history_keeps_order() {
        let store = test_store().await;

        store.add_message("conv1", "user", "hello").await.unwrap();
        store.add_message("conv1", "assistant", "hi there").await.unwrap();
        store.add_message("conv1", "user", "how are you").await.unwrap();

        let recent = store.recent_messages("conv1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "hi there");
        assert_eq!(recent[1].content, "how are you");

        let all = store.conversation_messages("conv1").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].role, "user");

        assert!(store.delete_conversation("conv1").await.unwrap());
        assert!(store.conversation_messages("conv1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversation_title_can_be_renamed() {
        let store = test_store().await;
        store.add_message("conv_r", "user", "hello").await.unwrap();

        let fresh = store.list_conversations().await.unwrap();
        assert_eq!(fresh[0].title, "");

        assert!(store.rename_conversation("conv_r", "Greetings").await.unwrap());
        let renamed = store.list_conversations().await.unwrap();
        assert_eq!(renamed[0].title, "Greetings");

        assert!(!store.rename_conversation("ghost", "nope").await.unwrap());
    }
}
