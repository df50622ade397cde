//! Durable job queue over the `jobs` table.
//!
//! Reservation is a single conditional `UPDATE ... RETURNING`, so under
//! concurrent pollers exactly one claim succeeds per row. A claimed job
//! carries a lease; jobs whose lease expired (crashed worker) become
//! claimable again on the next reservation.

use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::store::{now_iso, SqliteStore};

const LEASE_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Ingest,
    Embed,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingest => "ingest",
            JobKind::Embed => "embed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ingest" => Some(JobKind::Ingest),
            "embed" => Some(JobKind::Embed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Job {
    pub job_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    pub fn kind(&self) -> Option<JobKind> {
        JobKind::parse(&self.kind)
    }
}

#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    pub async fn enqueue(
        &self,
        job_id: &str,
        kind: JobKind,
        payload: &Value,
    ) -> Result<(), ApiError> {
        let raw = serde_json::to_string(payload).map_err(ApiError::internal)?;
        let now = now_iso();

        let result = sqlx::query(
            "INSERT INTO jobs (job_id, type, payload, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'queued', ?4, ?4)",
        )
        .bind(job_id)
        .bind(kind.as_str())
        .bind(raw)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(ApiError::DuplicateJob(job_id.to_string()))
            }
            Err(err) => Err(ApiError::internal(err)),
        }
    }

    /// Claims the oldest claimable job, or `None` when the queue is empty.
    ///
    /// Claimable means `queued`, or `running` with an expired lease. The
    /// conditional update and the returning read are one statement, which
    /// is what makes the queued-to-running transition atomic across
    /// pollers.
    pub async fn reserve_next(&self) -> Result<Option<Job>, ApiError> {
        let now = now_iso();
        let lease = lease_deadline();

        let row = sqlx::query(
            "UPDATE jobs
             SET status = 'running', updated_at = ?1, lease_expires_at = ?2
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'queued'
                    OR (status = 'running' AND lease_expires_at IS NOT NULL
                        AND lease_expires_at < ?1)
                 ORDER BY created_at, id
                 LIMIT 1
             )
             RETURNING job_id, type, payload, status, attempts, last_error,
                       created_at, updated_at",
        )
        .bind(&now)
        .bind(&lease)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.map(job_from_row).transpose().map_err(ApiError::internal)
    }

    pub async fn complete(&self, job_id: &str) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'done', updated_at = ?1, lease_expires_at = NULL
             WHERE job_id = ?2",
        )
        .bind(now_iso())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn fail(&self, job_id: &str, error: &str) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'error', attempts = attempts + 1, last_error = ?1,
                 updated_at = ?2, lease_expires_at = NULL
             WHERE job_id = ?3",
        )
        .bind(error)
        .bind(now_iso())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    /// Puts a reserved job back without counting an attempt. Used when a
    /// worker reserves a job of a kind it does not own.
    pub async fn release(&self, job_id: &str) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'queued', updated_at = ?1, lease_expires_at = NULL
             WHERE job_id = ?2 AND status = 'running'",
        )
        .bind(now_iso())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<Job>, ApiError> {
        let rows = sqlx::query(
            "SELECT job_id, type, payload, status, attempts, last_error,
                    created_at, updated_at
             FROM jobs ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, ApiError> {
        let row = sqlx::query(
            "SELECT job_id, type, payload, status, attempts, last_error,
                    created_at, updated_at
             FROM jobs WHERE job_id = ?1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.map(job_from_row).transpose().map_err(ApiError::internal)
    }
}

fn lease_deadline() -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(LEASE_SECONDS))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn job_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Job, sqlx::Error> {
    let payload_raw: String = row.try_get("payload")?;
    let payload = serde_json::from_str(&payload_raw)
        .unwrap_or(Value::Object(serde_json::Map::new()));

    Ok(Job {
        job_id: row.try_get("job_id")?,
        kind: row.try_get("type")?,
        payload,
        status: row.try_get("status")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_store;
    use serde_json::json;

    async fn test_queue() -> JobQueue {
        JobQueue::new(&test_store().await)
    }

    #[tokio::test]
    async fn lifecycle_queued_running_done() {
        let queue = test_queue().await;
        queue
            .enqueue("job1", JobKind::Ingest, &json!({"text": "hello"}))
            .await
            .unwrap();

        let job = queue.get("job1").await.unwrap().unwrap();
        assert_eq!(job.status, "queued");
        assert_eq!(job.attempts, 0);

        let reserved = queue.reserve_next().await.unwrap().unwrap();
        assert_eq!(reserved.job_id, "job1");
        assert_eq!(reserved.status, "running");
        assert_eq!(reserved.kind(), Some(JobKind::Ingest));

        queue.complete("job1").await.unwrap();
        let done = queue.get("job1").await.unwrap().unwrap();
        assert_eq!(done.status, "done");
        assert_eq!(done.attempts, 0);
    }

    #[tokio::test]
    async fn duplicate_job_id_is_rejected() {
        let queue = test_queue().await;
        queue.enqueue("dup", JobKind::Ingest, &json!({})).await.unwrap();

        let err = queue.enqueue("dup", JobKind::Embed, &json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn empty_queue_reserves_nothing() {
        let queue = test_queue().await;
        assert!(queue.reserve_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reservation_is_fifo_by_creation() {
        let queue = test_queue().await;
        queue.enqueue("a", JobKind::Ingest, &json!({})).await.unwrap();
        queue.enqueue("b", JobKind::Embed, &json!({})).await.unwrap();
        queue.enqueue("c", JobKind::Ingest, &json!({})).await.unwrap();

        assert_eq!(queue.reserve_next().await.unwrap().unwrap().job_id, "a");
        assert_eq!(queue.reserve_next().await.unwrap().unwrap().job_id, "b");
        assert_eq!(queue.reserve_next().await.unwrap().unwrap().job_id, "c");
        assert!(queue.reserve_next().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservation_is_exclusive() {
        let queue = test_queue().await;
        queue.enqueue("solo", JobKind::Embed, &json!({})).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.reserve_next().await }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn fail_records_error_and_attempts() {
        let queue = test_queue().await;
        queue.enqueue("bad", JobKind::Embed, &json!({})).await.unwrap();
        queue.reserve_next().await.unwrap().unwrap();

        queue.fail("bad", "chunk table exploded").await.unwrap();
        let job = queue.get("bad").await.unwrap().unwrap();
        assert_eq!(job.status, "error");
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("chunk table exploded"));
    }

    #[tokio::test]
    async fn released_job_is_reserved_again() {
        let queue = test_queue().await;
        queue.enqueue("loop", JobKind::Embed, &json!({})).await.unwrap();

        let first = queue.reserve_next().await.unwrap().unwrap();
        queue.release(&first.job_id).await.unwrap();

        let again = queue.get("loop").await.unwrap().unwrap();
        assert_eq!(again.status, "queued");
        assert_eq!(again.attempts, 0);

        let second = queue.reserve_next().await.unwrap().unwrap();
        assert_eq!(second.job_id, "loop");
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed() {
        let queue = test_queue().await;
        queue.enqueue("stale", JobKind::Ingest, &json!({})).await.unwrap();
        queue.reserve_next().await.unwrap().unwrap();

        // A live lease keeps the job invisible.
        assert!(queue.reserve_next().await.unwrap().is_none());

        // Simulate a crashed worker by backdating the lease.
        sqlx::query("UPDATE jobs SET lease_expires_at = '2000-01-01T00:00:00.000Z' WHERE job_id = 'stale'")
            .execute(&queue.pool)
            .await
            .unwrap();

        let reclaimed = queue.reserve_next().await.unwrap().unwrap();
        assert_eq!(reclaimed.job_id, "stale");
        assert_eq!(reclaimed.status, "running");
    }
}
