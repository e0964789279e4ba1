//! Application state.

use solpath_db::PgJobStore;
use solpath_scheduler::{JobService, PgJobQueue};
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jobs: Arc<JobService>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let store = Arc::new(PgJobStore::new(pool.clone()));
        let queue = Arc::new(PgJobQueue::new(pool.clone()));
        let jobs = Arc::new(JobService::new(store, queue));

        Self { pool, jobs }
    }
}
