//! Remote content service
//!
//! The repository talks to the server through two seams:
//!
//! - [`ContentSource`]: read-only reference content, returned as raw JSON for
//!   the validator to check
//! - [`UserStateSink`]: best-effort propagation of local user mutations
//!
//! [`HttpContentClient`] implements both over HTTP. [`Disconnected`] stands in
//! when no server is configured.

pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Bookmark, LastReadPosition};

pub use client::HttpContentClient;
pub use error::NetworkError;

/// Source of reference content
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the chapter catalog
    async fn fetch_chapters(&self) -> Result<Value, NetworkError>;

    /// Fetch one page of verses; `cursor` is `None` for the first page
    async fn fetch_verses_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Value, NetworkError>;

    /// Fetch the translation catalog
    async fn fetch_translations(&self) -> Result<Value, NetworkError>;
}

/// Remote persistence endpoint for user state
#[async_trait]
pub trait UserStateSink: Send + Sync {
    async fn push_bookmark(&self, bookmark: &Bookmark) -> Result<(), NetworkError>;

    async fn delete_bookmark(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> Result<(), NetworkError>;

    async fn push_last_read(&self, position: &LastReadPosition) -> Result<(), NetworkError>;
}

/// A content source with no server behind it
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

impl Disconnected {
    fn error() -> NetworkError {
        NetworkError::Unreachable("no content server configured".to_string())
    }
}

#[async_trait]
impl ContentSource for Disconnected {
    async fn fetch_chapters(&self) -> Result<Value, NetworkError> {
        Err(Self::error())
    }

    async fn fetch_verses_page(
        &self,
        _chapter_id: u16,
        _translation_id: &str,
        _cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Value, NetworkError> {
        Err(Self::error())
    }

    async fn fetch_translations(&self) -> Result<Value, NetworkError> {
        Err(Self::error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_is_unreachable() {
        let source = Disconnected;
        assert!(matches!(
            source.fetch_chapters().await,
            Err(NetworkError::Unreachable(_))
        ));
        assert!(source.fetch_verses_page(1, "en", None, 50).await.is_err());
        assert!(source.fetch_translations().await.is_err());
    }
}
