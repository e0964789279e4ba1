//! Job scheduling for solpath.
//!
//! Manages the render-job queue and the worker loop that drains it.
//! Uses PostgreSQL with SKIP LOCKED for distributed claiming and
//! LISTEN/NOTIFY for worker wakeup.

pub mod queue;
pub mod service;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use queue::{Delivery, JobQueue, PgJobQueue};
pub use service::JobService;
pub use worker::{Worker, run_stale_reaper};
