//! Error types for solpath.

use thiserror::Error;

use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid sol bounds: lower {lower} must be less than upper {upper}")]
    InvalidBounds { lower: i64, upper: i64 },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
