//! REST API server for solpath.
//!
//! Exposes render-job submission and status over HTTP.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use state::AppState;
