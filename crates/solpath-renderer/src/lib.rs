//! Render backends for solpath.
//!
//! The worker consumes the [`Renderer`] trait; the implementation here
//! delegates to the external plot-rendering service over HTTP.

pub mod http;

pub use http::HttpRenderer;
pub use solpath_core::{ArtifactRef, Renderer};
