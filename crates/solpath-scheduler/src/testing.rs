//! In-memory store, queue, and renderer used by the scheduler tests.
//!
//! The memory implementations mirror the guarded-transition semantics of
//! the PostgreSQL backends so the worker and service tests exercise the
//! same state machine the production code runs against.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use solpath_core::{ArtifactRef, Error, JobId, JobRecord, JobStatus, Renderer, Result, SolRange};
use solpath_db::{DbError, DbResult, JobStore};
use tokio::sync::Notify;

use crate::queue::{Delivery, JobQueue};

/// In-memory [`JobStore`] with the same transition guards as [`PgJobStore`].
///
/// [`PgJobStore`]: solpath_db::PgJobStore
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every operation fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DbError::Database(sqlx::Error::PoolClosed))
        } else {
            Ok(())
        }
    }

    fn transition(
        &self,
        id: JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut JobRecord),
    ) -> DbResult<JobRecord> {
        let mut jobs = self.jobs.lock().unwrap();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
        if !record.status.can_transition_to(to) {
            return Err(DbError::InvalidTransition {
                from: record.status,
                to,
            });
        }
        record.status = to;
        apply(record);
        Ok(record.clone())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> DbResult<()> {
        self.check_available()?;
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&record.id) {
            return Err(DbError::Duplicate(format!("job {}", record.id)));
        }
        jobs.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> DbResult<JobRecord> {
        self.check_available()?;
        let jobs = self.jobs.lock().unwrap();
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))
    }

    async fn mark_in_progress(&self, id: JobId) -> DbResult<JobRecord> {
        self.check_available()?;
        self.transition(id, JobStatus::InProgress, |record| {
            record.started_at = Some(Utc::now());
        })
    }

    async fn complete(&self, id: JobId, result_ref: &str) -> DbResult<JobRecord> {
        self.check_available()?;
        let result_ref = result_ref.to_string();
        self.transition(id, JobStatus::Complete, move |record| {
            record.result_ref = Some(result_ref);
            record.finished_at = Some(Utc::now());
        })
    }

    async fn fail(&self, id: JobId, error: &str) -> DbResult<JobRecord> {
        self.check_available()?;
        let error = error.to_string();
        self.transition(id, JobStatus::Failed, move |record| {
            record.error = Some(error);
            record.finished_at = Some(Utc::now());
        })
    }

    async fn list(&self, limit: i64) -> DbResult<Vec<JobRecord>> {
        self.check_available()?;
        let jobs = self.jobs.lock().unwrap();
        let mut records: Vec<JobRecord> = jobs.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn clear(&self) -> DbResult<u64> {
        self.check_available()?;
        let mut jobs = self.jobs.lock().unwrap();
        let count = jobs.len() as u64;
        jobs.clear();
        Ok(count)
    }
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<Delivery>,
    claimed: HashMap<uuid::Uuid, Delivery>,
}

/// In-memory [`JobQueue`] with FIFO order and claim/release semantics.
pub struct MemoryJobQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job_id: JobId) -> DbResult<()> {
        let delivery = Delivery {
            id: uuid::Uuid::now_v7(),
            job_id: *job_id.as_uuid(),
            status: "pending".to_string(),
            claimed_by: None,
            claimed_at: None,
            created_at: Utc::now(),
        };
        self.inner.lock().unwrap().pending.push_back(delivery);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn claim(&self, worker_id: &str) -> DbResult<Option<Delivery>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut delivery) = inner.pending.pop_front() else {
            return Ok(None);
        };
        delivery.status = "claimed".to_string();
        delivery.claimed_by = Some(worker_id.to_string());
        delivery.claimed_at = Some(Utc::now());
        inner.claimed.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn complete(&self, delivery_id: uuid::Uuid) -> DbResult<()> {
        self.inner.lock().unwrap().claimed.remove(&delivery_id);
        Ok(())
    }

    async fn release(&self, delivery_id: uuid::Uuid) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut delivery) = inner.claimed.remove(&delivery_id) {
            delivery.status = "pending".to_string();
            delivery.claimed_by = None;
            delivery.claimed_at = None;
            inner.pending.push_back(delivery);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn release_stale(&self, lease: Duration) -> DbResult<u64> {
        let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - lease;
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<uuid::Uuid> = inner
            .claimed
            .values()
            .filter(|d| d.claimed_at.is_some_and(|at| at <= cutoff))
            .map(|d| d.id)
            .collect();
        for id in &stale {
            let mut delivery = inner.claimed.remove(id).unwrap();
            delivery.status = "pending".to_string();
            delivery.claimed_by = None;
            delivery.claimed_at = None;
            inner.pending.push_back(delivery);
        }
        Ok(stale.len() as u64)
    }

    async fn wait_for_work(&self, timeout: Duration) {
        if !self.inner.lock().unwrap().pending.is_empty() {
            return;
        }
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }

    async fn clear(&self) -> DbResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let count = (inner.pending.len() + inner.claimed.len()) as u64;
        inner.pending.clear();
        inner.claimed.clear();
        Ok(count)
    }
}

enum StubOutcome {
    Succeed(String),
    Fail(String),
}

/// Scripted [`Renderer`] that records how often it was invoked.
pub struct StubRenderer {
    outcome: StubOutcome,
    calls: Arc<AtomicUsize>,
}

impl StubRenderer {
    pub fn succeeding(location: &str) -> Self {
        Self {
            outcome: StubOutcome::Succeed(location.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            outcome: StubOutcome::Fail(reason.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn render(&self, _range: SolRange) -> Result<ArtifactRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            StubOutcome::Succeed(location) => Ok(ArtifactRef {
                location: location.clone(),
            }),
            StubOutcome::Fail(reason) => Err(Error::RenderFailed(reason.clone())),
        }
    }
}
