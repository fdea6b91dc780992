//! Tilawa Core Library
//!
//! This crate provides the data layer for Tilawa, an offline-first reader
//! for scripture chapters, verses and translations.
//!
//! # Architecture
//!
//! - **Repository**: network-first reads with cache fallback, local-first
//!   user mutations
//! - **SQLite cache**: durable copy of everything read, plus bookmarks and
//!   last-read position
//! - **Remote client**: HTTP + JSON content service, bounded by a timeout
//!
//! Every remote payload is validated before it can reach the cache, and
//! identical concurrent requests are coalesced into one.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let repo = Repository::open(&config)?;
//!
//! // Read content (served from cache when offline)
//! let chapters = repo.get_chapters().await?;
//! let page = repo.get_verses_page(1, "en", None).await?;
//!
//! // Mutate user state (always committed locally)
//! repo.add_bookmark(&config.user_id, 2, 255).await?;
//! ```
//!
//! # Modules
//!
//! - `repository`: read and mutation API (main entry point)
//! - `models`: chapters, verses, translations and user state
//! - `validation`: checks remote payloads against the expected shape
//! - `storage`: SQLite cache
//! - `remote`: content service client
//! - `single_flight`: request coalescing
//! - `connectivity`: online/offline signal
//! - `config`: application configuration

pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod remote;
pub mod repository;
pub mod single_flight;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivitySignal};
pub use error::{
    FetchError, MutationPropagationFailed, RepositoryError, RepositoryResult, SchemaMismatch,
};
pub use models::{
    Bookmark, CacheEntry, Chapter, LastReadPosition, PageCursor, RevelationPlace, Source,
    Translation, TranslationRendering, Verse, VerseMetadata, VerseSetState, VersesPage,
};
pub use remote::{ContentSource, Disconnected, HttpContentClient, NetworkError, UserStateSink};
pub use repository::{DownloadReport, Repository, RepositoryEvent};
pub use single_flight::SingleFlight;
pub use storage::{CacheError, CacheStats, CacheStore};
