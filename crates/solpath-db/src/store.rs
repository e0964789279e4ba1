//! Job store: durable persistence of job records.
//!
//! Status transitions are enforced with guarded single-statement updates,
//! so concurrent workers racing on the same job cannot corrupt its record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solpath_core::{JobId, JobRecord, JobStatus};
use sqlx::PgPool;
use std::str::FromStr;

use crate::{DbError, DbResult};

/// A row from the `jobs` table. Status is stored as text and parsed into
/// [`JobStatus`] when converting to a [`JobRecord`].
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: uuid::Uuid,
    status: String,
    lower_sol: i64,
    upper_sol: i64,
    result_ref: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<JobRecord> {
        let status = JobStatus::from_str(&row.status)
            .map_err(|_| DbError::Corrupt(format!("job {} has status '{}'", row.id, row.status)))?;
        Ok(JobRecord {
            id: JobId::from_uuid(row.id),
            status,
            lower: row.lower_sol,
            upper: row.upper_sol,
            result_ref: row.result_ref,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

/// Persistence operations for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with [`DbError::Duplicate`] if the id exists.
    async fn create(&self, record: &JobRecord) -> DbResult<()>;

    /// Fetch a record by id.
    async fn get(&self, id: JobId) -> DbResult<JobRecord>;

    /// Transition `submitted -> in_progress`, stamping `started_at`.
    async fn mark_in_progress(&self, id: JobId) -> DbResult<JobRecord>;

    /// Transition `in_progress -> complete`, persisting the artifact reference.
    async fn complete(&self, id: JobId, result_ref: &str) -> DbResult<JobRecord>;

    /// Transition to `failed`, persisting the error description.
    async fn fail(&self, id: JobId, error: &str) -> DbResult<JobRecord>;

    /// List recent records, newest first.
    async fn list(&self, limit: i64) -> DbResult<Vec<JobRecord>>;

    /// Administrative bulk delete of all records. Returns the count removed.
    async fn clear(&self) -> DbResult<u64>;
}

/// PostgreSQL implementation of [`JobStore`].
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguish a missing row from an out-of-order transition after a
    /// guarded update matched nothing.
    async fn transition_conflict(&self, id: JobId, to: JobStatus) -> DbError {
        match self.get(id).await {
            Ok(record) => DbError::InvalidTransition {
                from: record.status,
                to,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, record: &JobRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, status, lower_sol, upper_sol, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.status.as_str())
        .bind(record.lower)
        .bind(record.upper)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate(format!("job {}", record.id))
            }
            _ => DbError::Database(e),
        })?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        row.try_into()
    }

    async fn mark_in_progress(&self, id: JobId) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'in_progress', started_at = NOW()
            WHERE id = $1 AND status = 'submitted'
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_conflict(id, JobStatus::InProgress).await),
        }
    }

    async fn complete(&self, id: JobId, result_ref: &str) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'complete', result_ref = $2, finished_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(result_ref)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_conflict(id, JobStatus::Complete).await),
        }
    }

    async fn fail(&self, id: JobId, error: &str) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'failed', error = $2, finished_at = NOW()
            WHERE id = $1 AND status IN ('submitted', 'in_progress')
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_conflict(id, JobStatus::Failed).await),
        }
    }

    async fn list(&self, limit: i64) -> DbResult<Vec<JobRecord>> {
        let rows =
            sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM jobs").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
