//! Lookout Storage - Storage abstraction and redb backend
//!
//! This crate provides:
//! - KVStore trait for storage abstraction
//! - redb-based implementation
//! - Key encoding and indexing
//! - Transactional repositories for watchers, triggers and executions

pub mod encoding;
pub mod error;
pub mod kv;
pub mod redb_backend;
pub mod repository;
pub mod store;

// Re-export commonly used types
pub use encoding::{IndexKey, KeyEncoder, Table};
pub use error::{Result, StorageError};
pub use kv::{KVStore, Transaction};
pub use redb_backend::RedbBackend;
pub use repository::{ExecutionRepository, TriggerRepository, WatcherFilter, WatcherRepository};
pub use store::{Store, StoreTx};
