//! Storage layer
//!
//! Durable SQLite cache for reference content and user state.
//!
//! ## Architecture
//!
//! - **Reference tables**: chapters, translations and verse sets, written
//!   through from validated network responses and replaced wholesale
//! - **User tables**: bookmarks and last-read, written locally first and
//!   never touched by reference eviction
//!
//! All writes are transactional; readers see either the previous or the new
//! state of a chapter's verse set.

pub mod cache;
pub mod error;
pub mod schema;

pub use cache::{CacheStats, CacheStore, MergeOutcome};
pub use error::{CacheError, CacheResult};
pub use schema::{get_schema_version, init_schema, needs_init, SCHEMA_VERSION};
