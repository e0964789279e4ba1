//! Database error types.

use solpath_core::JobStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for solpath_core::Error {
    fn from(err: DbError) -> Self {
        use solpath_core::Error;
        match err {
            DbError::NotFound(msg) => Error::NotFound(msg),
            DbError::Duplicate(msg) => Error::Conflict(msg),
            DbError::InvalidTransition { from, to } => Error::InvalidTransition { from, to },
            DbError::Corrupt(msg) => Error::Internal(msg),
            DbError::Database(e) => Error::StoreUnavailable(e.to_string()),
            DbError::Migration(e) => Error::StoreUnavailable(e.to_string()),
        }
    }
}
