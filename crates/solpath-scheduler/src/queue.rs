//! Job queue implementation using PostgreSQL.
//!
//! Delivery is at-least-once: a crashed worker's claims are released back
//! to pending by the stale reaper, and the job store's guarded status
//! transitions make duplicate deliveries harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solpath_core::JobId;
use solpath_db::DbResult;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::Mutex;

/// Postgres notification channel signalled on every push.
const NOTIFY_CHANNEL: &str = "solpath_job_queue";

/// A queued delivery of a job identifier.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub id: uuid::Uuid,
    pub job_id: uuid::Uuid,
    pub status: String,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Ordered hand-off of job identifiers from submitters to workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a delivery for the given job. Errors propagate to the
    /// submitter; a push is never silently dropped.
    async fn push(&self, job_id: JobId) -> DbResult<()>;

    /// Claim the next pending delivery, oldest first.
    async fn claim(&self, worker_id: &str) -> DbResult<Option<Delivery>>;

    /// Mark a claimed delivery as done.
    async fn complete(&self, delivery_id: uuid::Uuid) -> DbResult<()>;

    /// Release a claimed delivery back to pending.
    async fn release(&self, delivery_id: uuid::Uuid) -> DbResult<()>;

    /// Release deliveries claimed longer than `lease` ago and never
    /// finished. Returns the number requeued.
    async fn release_stale(&self, lease: Duration) -> DbResult<u64>;

    /// Block until a push may have made work available, or `timeout`
    /// elapses. Spurious wakeups are fine; callers re-claim in a loop.
    async fn wait_for_work(&self, timeout: Duration);

    /// Drop all deliveries. Administrative, paired with clearing the store.
    async fn clear(&self) -> DbResult<u64>;
}

/// Job queue backed by PostgreSQL.
pub struct PgJobQueue {
    pool: PgPool,
    listener: Mutex<Option<PgListener>>,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            listener: Mutex::new(None),
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn push(&self, job_id: JobId) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job_queue (id, job_id, status, created_at)
            VALUES ($1, $2, 'pending', NOW())
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(job_id.as_uuid())
        .execute(&self.pool)
        .await?;

        // Wakeup only; a missed notification is covered by the claim
        // loop's wait timeout.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
        {
            tracing::debug!(error = %e, "Queue notify failed");
        }
        Ok(())
    }

    /// Uses SKIP LOCKED so concurrent workers never contend on the same
    /// delivery.
    async fn claim(&self, worker_id: &str) -> DbResult<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            UPDATE job_queue
            SET status = 'claimed', claimed_by = $1, claimed_at = NOW()
            WHERE id = (
                SELECT id FROM job_queue
                WHERE status = 'pending'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(delivery)
    }

    async fn complete(&self, delivery_id: uuid::Uuid) -> DbResult<()> {
        sqlx::query("UPDATE job_queue SET status = 'completed' WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release(&self, delivery_id: uuid::Uuid) -> DbResult<()> {
        sqlx::query(
            "UPDATE job_queue SET status = 'pending', claimed_by = NULL, claimed_at = NULL WHERE id = $1",
        )
        .bind(delivery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_stale(&self, lease: Duration) -> DbResult<u64> {
        let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - lease;
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'pending', claimed_by = NULL, claimed_at = NULL
            WHERE status = 'claimed' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn wait_for_work(&self, timeout: Duration) {
        let mut guard = self.listener.lock().await;

        if guard.is_none() {
            match PgListener::connect_with(&self.pool).await {
                Ok(mut listener) => match listener.listen(NOTIFY_CHANNEL).await {
                    Ok(()) => *guard = Some(listener),
                    Err(e) => tracing::warn!(error = %e, "Failed to LISTEN on queue channel"),
                },
                Err(e) => tracing::warn!(error = %e, "Failed to connect queue listener"),
            }
        }

        match guard.as_mut() {
            Some(listener) => {
                if let Ok(Err(e)) = tokio::time::timeout(timeout, listener.recv()).await {
                    tracing::warn!(error = %e, "Queue listener dropped; reconnecting on next wait");
                    *guard = None;
                }
            }
            // No listener available; a plain sleep keeps the claim loop
            // from spinning.
            None => tokio::time::sleep(timeout).await,
        }
    }

    async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM job_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
