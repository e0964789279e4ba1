//! Worker that processes render jobs from the queue.

use std::sync::Arc;
use std::time::Duration;

use solpath_core::{JobId, Renderer};
use solpath_db::{DbError, DbResult, JobStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::{Delivery, JobQueue};

/// How long to wait for a queue notification before re-polling.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff after a failed claim attempt.
const CLAIM_BACKOFF: Duration = Duration::from_secs(5);

/// Consecutive claim failures tolerated before the queue is considered
/// unavailable and the worker gives up.
const MAX_CLAIM_FAILURES: u32 = 3;

/// Outcome of handling one delivery.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// Render succeeded and the job is complete.
    Completed,
    /// A failure was recorded on the job itself.
    Failed,
    /// The record was already terminal, or another delivery won the race.
    Duplicate,
    /// The record was not visible yet; the delivery was released.
    MissingRecord,
}

/// A worker that claims queued jobs and drives them to a terminal status.
pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    renderer: Arc<dyn Renderer>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            queue,
            renderer,
        }
    }

    /// Run the worker loop until the cancellation token is triggered.
    ///
    /// Per-job failures are recorded on the job and never stop the loop;
    /// only store or queue unavailability makes this return an error.
    pub async fn run(&self, cancel: CancellationToken) -> DbResult<()> {
        info!(worker_id = %self.id, renderer = self.renderer.name(), "Starting worker");
        let mut claim_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!(worker_id = %self.id, "Worker shutting down");
                return Ok(());
            }

            match self.queue.claim(&self.id).await {
                Ok(Some(delivery)) => {
                    claim_failures = 0;
                    self.handle_delivery(delivery).await?;
                }
                Ok(None) => {
                    claim_failures = 0;
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = self.queue.wait_for_work(WAIT_TIMEOUT) => {}
                    }
                }
                Err(e) => {
                    claim_failures += 1;
                    if claim_failures >= MAX_CLAIM_FAILURES {
                        return Err(e);
                    }
                    warn!(error = %e, attempt = claim_failures, "Failed to claim delivery");
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(CLAIM_BACKOFF) => {}
                    }
                }
            }
        }
    }

    /// Drive one delivery through the job state machine.
    ///
    /// Returns `Err` only when the store itself is unreachable; everything
    /// else resolves into the job's own record.
    async fn handle_delivery(&self, delivery: Delivery) -> DbResult<Outcome> {
        let job_id = JobId::from_uuid(delivery.job_id);

        let record = match self.store.get(job_id).await {
            Ok(record) => record,
            Err(DbError::NotFound(_)) => {
                // Push raced ahead of store visibility; requeue and let a
                // later claim retry it.
                warn!(job_id = %job_id, "Delivery for unknown job; releasing");
                self.queue.release(delivery.id).await?;
                return Ok(Outcome::MissingRecord);
            }
            Err(e) => return Err(e),
        };

        if record.is_terminal() {
            info!(job_id = %job_id, status = %record.status, "Duplicate delivery for terminal job; discarding");
            self.queue.complete(delivery.id).await?;
            return Ok(Outcome::Duplicate);
        }

        match self.store.mark_in_progress(job_id).await {
            Ok(_) => {}
            Err(DbError::InvalidTransition { from, to }) => {
                // Another delivery of the same job got there first.
                warn!(job_id = %job_id, %from, %to, "Lost in-progress race; discarding delivery");
                self.queue.complete(delivery.id).await?;
                return Ok(Outcome::Duplicate);
            }
            Err(e) => return Err(e),
        }

        let range = record.range();
        let outcome = if let Err(e) = range.validate() {
            // The submitter should have rejected this; record a failed job
            // rather than crashing the worker.
            warn!(job_id = %job_id, lower = range.lower, upper = range.upper, "Job has invalid bounds");
            self.record_failure(job_id, &e.to_string()).await?
        } else {
            info!(job_id = %job_id, lower = range.lower, upper = range.upper, "Rendering");
            match self.renderer.render(range).await {
                Ok(artifact) => self.record_completion(job_id, &artifact.location).await?,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Render failed");
                    self.record_failure(job_id, &e.to_string()).await?
                }
            }
        };

        self.queue.complete(delivery.id).await?;
        Ok(outcome)
    }

    /// Persist a successful render, tolerating a concurrent duplicate that
    /// already finished the job.
    async fn record_completion(&self, job_id: JobId, location: &str) -> DbResult<Outcome> {
        match self.store.complete(job_id, location).await {
            Ok(_) => {
                info!(job_id = %job_id, artifact = %location, "Job complete");
                Ok(Outcome::Completed)
            }
            Err(DbError::InvalidTransition { from, to }) => {
                warn!(job_id = %job_id, %from, %to, "Job finished elsewhere during render");
                Ok(Outcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a render failure, tolerating a concurrent duplicate.
    async fn record_failure(&self, job_id: JobId, reason: &str) -> DbResult<Outcome> {
        match self.store.fail(job_id, reason).await {
            Ok(_) => Ok(Outcome::Failed),
            Err(DbError::InvalidTransition { from, to }) => {
                warn!(job_id = %job_id, %from, %to, "Job finished elsewhere; dropping failure");
                Ok(Outcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}

/// Periodically release stale queue claims back to pending.
///
/// Covers workers that died between claiming a delivery and finishing it.
/// Jobs already marked in-progress are not retried; their duplicate
/// delivery resolves against the store and is discarded.
pub async fn run_stale_reaper(
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    lease: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => match queue.release_stale(lease).await {
                Ok(0) => {}
                Ok(n) => info!(released = n, "Released stale queue claims"),
                Err(e) => warn!(error = %e, "Stale-claim sweep failed"),
            },
        }
    }
}
