//! Submission-side job operations.

use std::sync::Arc;

use solpath_core::{Error, JobId, JobRecord, Result, SolRange};
use solpath_db::JobStore;
use tracing::{error, info};

use crate::queue::JobQueue;

/// Submission API over the job store and queue.
///
/// Handles are injected at construction; the HTTP layer owns one instance
/// for the lifetime of the process.
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Validate the sol bounds, persist a new job record, then enqueue its
    /// id. The record is created before the push so a worker can never
    /// observe a queued id with no backing record.
    pub async fn submit(&self, lower: i64, upper: i64) -> Result<JobRecord> {
        let range = SolRange::new(lower, upper)?;
        let record = JobRecord::new(range);
        self.store.create(&record).await?;

        if let Err(e) = self.queue.push(record.id).await {
            // The record exists but will never be delivered; fail it so
            // the client sees a terminal status instead of a stuck
            // submission.
            error!(job_id = %record.id, error = %e, "Failed to enqueue job");
            let reason = format!("enqueue failed: {e}");
            if let Err(fail_err) = self.store.fail(record.id, &reason).await {
                error!(job_id = %record.id, error = %fail_err, "Failed to mark unenqueued job as failed");
            }
            return Err(Error::StoreUnavailable(e.to_string()));
        }

        info!(job_id = %record.id, lower, upper, "Job submitted");
        Ok(record)
    }

    /// Look up a job record by id.
    pub async fn status(&self, id: JobId) -> Result<JobRecord> {
        Ok(self.store.get(id).await?)
    }

    /// List recent jobs, newest first.
    pub async fn list(&self, limit: i64) -> Result<Vec<JobRecord>> {
        Ok(self.store.list(limit).await?)
    }

    /// Administrative bulk clear of all job records and queued deliveries.
    /// Returns the number of records removed.
    pub async fn clear(&self) -> Result<u64> {
        let deliveries = self.queue.clear().await?;
        let jobs = self.store.clear().await?;
        info!(jobs, deliveries, "Cleared job store and queue");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryJobQueue, MemoryJobStore};
    use solpath_core::JobStatus;

    fn service() -> (Arc<MemoryJobStore>, Arc<MemoryJobQueue>, JobService) {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let service = JobService::new(store.clone(), queue.clone());
        (store, queue, service)
    }

    #[tokio::test]
    async fn submit_then_status_round_trips() {
        let (_, _, service) = service();

        let record = service.submit(200, 500).await.unwrap();
        assert_eq!(record.status, JobStatus::Submitted);

        let polled = service.status(record.id).await.unwrap();
        assert_eq!(polled.id, record.id);
        assert_eq!(polled.status, JobStatus::Submitted);
        assert_eq!(polled.lower, 200);
        assert_eq!(polled.upper, 500);
    }

    #[tokio::test]
    async fn submit_creates_record_before_delivery() {
        let (store, queue, service) = service();

        let record = service.submit(1, 2).await.unwrap();

        let delivery = queue.claim("w1").await.unwrap().unwrap();
        assert_eq!(delivery.job_id, *record.id.as_uuid());
        assert!(store.get(record.id).await.is_ok());
    }

    #[tokio::test]
    async fn inverted_bounds_are_rejected_without_side_effects() {
        let (store, queue, service) = service();

        let err = service.submit(500, 200).await.unwrap_err();
        assert!(matches!(err, Error::InvalidBounds { lower: 500, upper: 200 }));
        // Equal bounds are invalid too.
        assert!(service.submit(7, 7).await.is_err());

        assert!(store.list(10).await.unwrap().is_empty());
        assert!(queue.claim("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_not_found() {
        let (_, _, service) = service();
        let err = service.status(JobId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn clear_empties_store_and_queue() {
        let (store, queue, service) = service();

        service.submit(1, 2).await.unwrap();
        service.submit(3, 4).await.unwrap();

        let removed = service.clear().await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.list(10).await.unwrap().is_empty());
        assert!(queue.claim("w1").await.unwrap().is_none());
    }
}
