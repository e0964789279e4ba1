//! Core domain types and traits for the solpath mission-path service.
//!
//! This crate contains:
//! - Job identifiers and common types
//! - The job record and its status state machine
//! - The render capability trait consumed by the worker

pub mod error;
pub mod id;
pub mod job;
pub mod render;

pub use error::{Error, Result};
pub use id::JobId;
pub use job::{JobRecord, JobStatus, SolRange};
pub use render::{ArtifactRef, Renderer};
