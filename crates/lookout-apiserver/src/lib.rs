//! Lookout API Server - HTTP surface of the event watcher control plane
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Watcher CRUD endpoints
//! - Agent endpoints: event ingest and watcher resync
//! - Intercepted event browsing with filtering and pagination

pub mod error;
pub mod handlers;
pub mod params;
pub mod response;
pub mod server;
pub mod state;

// Re-export commonly used types
pub use error::{ApiError, Result};
pub use server::{ApiServer, Config};
pub use state::AppState;
