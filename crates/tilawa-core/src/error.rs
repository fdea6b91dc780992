//! Repository error taxonomy
//!
//! Only [`RepositoryError`] ever reaches callers. Network failures and schema
//! mismatches are recovered by falling back to the cache, and propagation
//! failures are only published as events.

use thiserror::Error;

use crate::remote::NetworkError;
use crate::storage::CacheError;

/// A remote payload did not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Schema mismatch in {kind} payload: {reason}")]
pub struct SchemaMismatch {
    /// Payload kind being validated (e.g. "chapters")
    pub kind: &'static str,
    pub reason: String,
}

impl SchemaMismatch {
    pub fn new(kind: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Outcome of a failed network refresh, shared by every single-flight waiter
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Schema(#[from] SchemaMismatch),

    /// The cache could not be written, so the fresh data cannot be trusted
    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    /// The producer task died before finishing
    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Short label used in logs to tell failure kinds apart
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Schema(_) => "schema_mismatch",
            FetchError::CacheWrite(_) => "cache_write",
            FetchError::Aborted(_) => "aborted",
        }
    }

    pub(crate) fn cache_write(error: CacheError) -> Self {
        FetchError::CacheWrite(error.to_string())
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(error: tokio::task::JoinError) -> Self {
        FetchError::Aborted(error.to_string())
    }
}

/// Errors surfaced to repository callers
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// No network result and nothing cached
    #[error("{resource} is unavailable: offline and no cached content")]
    ContentUnavailable { resource: String },

    /// Caller passed an argument outside the valid domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Local store failure with no fallback (user mutations, corrupt reads)
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RepositoryError {
    pub(crate) fn unavailable(resource: impl Into<String>) -> Self {
        RepositoryError::ContentUnavailable {
            resource: resource.into(),
        }
    }

    pub fn is_content_unavailable(&self) -> bool {
        matches!(self, RepositoryError::ContentUnavailable { .. })
    }
}

/// A local mutation could not be pushed to the remote user-state endpoint.
///
/// Never returned to callers: the local commit already succeeded.
#[derive(Error, Debug, Clone)]
#[error("Failed to propagate {mutation}: {source}")]
pub struct MutationPropagationFailed {
    /// Human-readable description of the mutation
    pub mutation: String,
    #[source]
    pub source: NetworkError,
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
