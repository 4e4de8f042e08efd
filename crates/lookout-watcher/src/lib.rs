//! Lookout Watcher - Watcher orchestration
//!
//! This crate provides:
//! - Watcher CRUD with fan-out to cluster agents
//! - Trigger reference resolution against the job catalog
//! - Intercepted event ingestion and job hand-off
//! - Watcher and intercepted event queries with executor status overlay

pub mod catalog;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod ingest;
pub mod locks;
pub mod notifier;
pub mod query;
pub mod resolver;
pub mod service;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use catalog::{CatalogConfig, CatalogLookup, EnvironmentRef, JobRef, PipelineRef, StaticCatalog};
pub use error::{Result, WatcherError};
pub use executor::{HttpJobExecutor, InMemoryJobExecutor, JobExecutor, JobRunRequest};
pub use fanout::{BroadcastReport, Broadcaster, ClusterTarget, PushOutcome};
pub use ingest::EventIngestor;
pub use notifier::{BroadcastNotifier, ExecutionNotification, Notifier, NotifierConfig};
pub use query::QueryApi;
pub use resolver::ReferenceResolver;
pub use service::WatcherService;
