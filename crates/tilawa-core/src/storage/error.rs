//! Cache store error handling
//!
//! Provides typed errors for cache operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during cache store operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to create the cache directory
    #[error("Failed to create cache directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing the cache database
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A row the write depends on is missing
    #[error("Not found in cache: {what}")]
    NotFound { what: String },

    /// A transactional write was rolled back
    #[error("Cache write failed for {what}: {source}")]
    WriteFailed {
        what: String,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite error outside a write transaction
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection mutex was poisoned by a panicking writer
    #[error("Cache lock poisoned")]
    LockPoisoned,

    /// A blocking store task failed to run to completion
    #[error("Cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    /// Create an error from an I/O error with path context
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => CacheError::PermissionDenied {
                path,
                source: error,
            },
            _ => CacheError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Wrap a SQLite error raised inside a write transaction
    pub fn write_failed(what: impl Into<String>, source: rusqlite::Error) -> Self {
        CacheError::WriteFailed {
            what: what.into(),
            source,
        }
    }

    /// Check if this error is recoverable by the user
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CacheError::PermissionDenied { .. } | CacheError::CreateDirectory { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            CacheError::PermissionDenied { .. } => {
                Some("Check file and directory permissions on the data directory.")
            }
            CacheError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            CacheError::Database(_) | CacheError::Serialization(_) => Some(
                "The cache may be corrupted. Run `tilawa cache clear` to rebuild it; \
                 bookmarks are kept.",
            ),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(error: tokio::task::JoinError) -> Self {
        CacheError::Task(error.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
