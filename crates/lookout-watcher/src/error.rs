// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use lookout_core::CoreError;
use lookout_storage::StorageError;
use miette::Diagnostic;
use thiserror::Error;

/// Watcher service error type
#[derive(Error, Debug, Diagnostic)]
pub enum WatcherError {
    /// Request violates a payload or model rule
    #[error("Validation failed: {message}")]
    #[diagnostic(
        code(watcher::validation),
        help("Fix the request; nothing was written")
    )]
    Validation {
        message: String,
    },

    /// Entity does not exist or is inactive
    #[error("{resource} {id} not found")]
    #[diagnostic(
        code(watcher::not_found),
        help("The id may be wrong or the entity may have been deleted")
    )]
    NotFound {
        resource: String,
        id: String,
    },

    /// Duplicate name or illegal state transition
    #[error("Conflict: {message}")]
    #[diagnostic(
        code(watcher::conflict),
        help("Choose another name or re-read the entity before retrying")
    )]
    Conflict {
        message: String,
    },

    /// Unexpected store or collaborator failure
    #[error("Store failure: {message}")]
    #[diagnostic(
        code(watcher::store_failure),
        help("The transaction was rolled back; retry the request")
    )]
    StoreFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The CI executor failed or answered with something unusable
    #[error("Job executor failed: {message}")]
    #[diagnostic(
        code(watcher::executor),
        help("Check that the CI executor is reachable; stored rows keep their last known status")
    )]
    Executor {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type for watcher service operations
pub type Result<T> = std::result::Result<T, WatcherError>;

impl WatcherError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn store_failure(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StoreFailure {
            message: message.into(),
            source,
        }
    }

    pub fn executor(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Executor {
            message: message.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StorageError> for WatcherError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RowNotFound { table, id } => WatcherError::not_found(table, id),
            StorageError::Conflict { message } => WatcherError::conflict(message),
            other => WatcherError::store_failure(other.to_string(), Some(Box::new(other))),
        }
    }
}

impl From<CoreError> for WatcherError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationFailed { .. } => WatcherError::validation(err.to_string()),
            CoreError::InvalidStatusTransition { .. } => WatcherError::conflict(err.to_string()),
            other => WatcherError::store_failure(other.to_string(), Some(Box::new(other))),
        }
    }
}

impl From<lookout_agent::AgentError> for WatcherError {
    fn from(err: lookout_agent::AgentError) -> Self {
        match err {
            lookout_agent::AgentError::UnknownCluster { cluster } => {
                WatcherError::validation(format!("unknown cluster '{}'", cluster))
            }
            other => WatcherError::store_failure(
                format!("cluster registry failed: {}", other),
                Some(Box::new(other)),
            ),
        }
    }
}
