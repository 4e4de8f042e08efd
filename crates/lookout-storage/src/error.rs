// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Storage error type
#[derive(Error, Debug, Diagnostic)]
pub enum StorageError {
    /// No row with this id in the table
    #[error("{table} {id} not found")]
    #[diagnostic(
        code(storage::row_not_found),
        help("The id may be wrong; deactivated rows are still readable by id")
    )]
    RowNotFound {
        table: String,
        id: u64,
    },

    /// Write rejected because it would break a row invariant
    #[error("Conflict: {message}")]
    #[diagnostic(
        code(storage::conflict),
        help("Re-read the row; it may be inactive or in a terminal state")
    )]
    Conflict {
        message: String,
    },

    /// A stored value does not decode into its row type
    #[error("Corrupt record at {key}: {message}")]
    #[diagnostic(
        code(storage::corrupt_record),
        help("The database was written by an incompatible version or edited by hand")
    )]
    CorruptRecord {
        key: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Opening or reading the redb file failed
    #[error("Database error: {message}")]
    #[diagnostic(
        code(storage::database_error),
        help("Check that the data directory is writable and no other process holds the database")
    )]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Begin, commit or abort failed, or the transaction was already finished
    #[error("Transaction error: {message}")]
    #[diagnostic(
        code(storage::transaction_error),
        help("Nothing was written; retry the operation")
    )]
    TransactionError {
        message: String,
    },
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn row_not_found(table: impl ToString, id: u64) -> Self {
        Self::RowNotFound {
            table: table.to_string(),
            id,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn corrupt_record(
        key: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            message: message.into(),
            source,
        }
    }

    pub fn database_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    /// Record codec failure at `key`
    pub(crate) fn codec(key: &str, err: serde_json::Error) -> Self {
        Self::corrupt_record(key, err.to_string(), Some(Box::new(err)))
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::transaction_error(format!("Failed to begin: {}", err))
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::transaction_error(format!("Failed to commit: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::database_error(err.to_string(), Some(Box::new(err)))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::database_error(format!("records table: {}", err), Some(Box::new(err)))
    }
}
