//! Job records and the status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::id::JobId;

/// Status of a render job.
///
/// Progression is forward-only: `Submitted -> InProgress -> Complete | Failed`.
/// A job whose enqueue step failed may go straight from `Submitted` to
/// `Failed` so the client never sees a permanently stuck submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Complete,
    Failed,
}

impl JobStatus {
    /// Stable wire/storage form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::InProgress => "in_progress",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether `next` is a legal forward transition from this status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Submitted, InProgress) | (Submitted, Failed) | (InProgress, Complete) | (InProgress, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(JobStatus::Submitted),
            "in_progress" => Ok(JobStatus::InProgress),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Internal(format!("unknown job status: {other}"))),
        }
    }
}

/// An inclusive-exclusive window of mission sols to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolRange {
    pub lower: i64,
    pub upper: i64,
}

impl SolRange {
    /// Build a validated range. `lower` must be strictly less than `upper`.
    pub fn new(lower: i64, upper: i64) -> Result<Self> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(self) -> Result<()> {
        if self.lower < self.upper {
            Ok(())
        } else {
            Err(Error::InvalidBounds {
                lower: self.lower,
                upper: self.upper,
            })
        }
    }
}

/// A render job as persisted in the job store.
///
/// `result_ref` is set iff the job completed; `error` is set iff it failed.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub lower: i64,
    pub upper: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a fresh record in `Submitted` status for the given range.
    pub fn new(range: SolRange) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Submitted,
            lower: range.lower,
            upper: range.upper,
            result_ref: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn range(&self) -> SolRange {
        SolRange {
            lower: self.lower,
            upper: self.upper,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
