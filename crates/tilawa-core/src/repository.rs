//! Content repository
//!
//! The single entry point for reading reference content and mutating user
//! state. Reads are network-first with cache fallback:
//!
//! ```text
//! online:  fetch (coalesced) -> validate -> write through -> network result
//!            \-- any failure -----------------------------> cache
//! offline: cache
//! cache:   cached result, or ContentUnavailable
//! ```
//!
//! A chapter whose verse set is complete is served from cache without a
//! network attempt. User mutations are committed to the cache before the call
//! returns, then pushed to the server in the background when a user-state
//! sink is configured. A single worker pushes them in commit order. A failed
//! push is reported as an event and never undone locally.
//!
//! ## Usage
//!
//! ```ignore
//! let repo = Repository::open(&config)?;
//!
//! let chapters = repo.get_chapters().await?;
//! let page = repo.get_verses_page(1, "en", None).await?;
//! repo.add_bookmark("local", 1, 5).await?;
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connectivity::{AlwaysOnline, Connectivity, ConnectivitySignal};
use crate::error::{
    FetchError, MutationPropagationFailed, RepositoryError, RepositoryResult, SchemaMismatch,
};
use crate::models::{
    is_valid_chapter_id, Bookmark, CacheEntry, Chapter, LastReadPosition, Translation, Verse,
    VerseSetState, VersesPage, CHAPTER_COUNT,
};
use crate::remote::{ContentSource, Disconnected, HttpContentClient, NetworkError, UserStateSink};
use crate::single_flight::SingleFlight;
use crate::storage::{CacheResult, CacheStats, CacheStore, MergeOutcome};
use crate::validation::{validate_chapters, validate_translations, validate_verses_page};

const CHAPTERS_KEY: &str = "chapters";
const TRANSLATIONS_KEY: &str = "translations";
const EVENT_CAPACITY: usize = 64;

/// Default verses per page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Notifications for observers of the repository
#[derive(Debug, Clone)]
pub enum RepositoryEvent {
    /// A network refresh failed and the read was served from cache
    FellBack {
        resource: String,
        /// Failure kind: network, schema_mismatch, cache_write or aborted
        kind: &'static str,
        reason: String,
    },
    /// A local mutation reached the server
    Propagated { mutation: String },
    /// A local mutation could not be pushed; the local commit stands
    PropagationFailed(MutationPropagationFailed),
}

/// Summary of a chapter download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Pages fetched by this call
    pub pages: usize,
    /// Verses newly cached by this call
    pub inserted: usize,
    pub cached_verses: u16,
    pub verse_count: u16,
    pub complete: bool,
}

/// A freshly fetched value that has been written through
#[derive(Debug, Clone)]
struct Fresh<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

/// A page fetched from the network and merged into the cache
#[derive(Debug, Clone)]
struct FetchedPage {
    page: VersesPage,
    merged: MergeOutcome,
    fetched_at: DateTime<Utc>,
}

/// A user-state change awaiting propagation
enum Mutation {
    PutBookmark(Bookmark),
    DeleteBookmark {
        user_id: String,
        chapter_id: u16,
        verse_number: u16,
    },
    PutLastRead(LastReadPosition),
}

impl Mutation {
    fn describe(&self) -> String {
        match self {
            Mutation::PutBookmark(b) => format!("add bookmark {}", b.verse_key()),
            Mutation::DeleteBookmark {
                chapter_id,
                verse_number,
                ..
            } => format!("remove bookmark {}:{}", chapter_id, verse_number),
            Mutation::PutLastRead(p) => {
                format!("last-read {}:{}", p.chapter_id, p.verse_number)
            }
        }
    }

    async fn push(&self, sink: &dyn UserStateSink) -> Result<(), NetworkError> {
        match self {
            Mutation::PutBookmark(b) => sink.push_bookmark(b).await,
            Mutation::DeleteBookmark {
                user_id,
                chapter_id,
                verse_number,
            } => sink.delete_bookmark(user_id, *chapter_id, *verse_number).await,
            Mutation::PutLastRead(p) => sink.push_last_read(p).await,
        }
    }
}

/// Offline-first content repository
///
/// Cheap to clone; clones share the cache, the in-flight requests and the
/// event channel.
#[derive(Clone)]
pub struct Repository {
    store: Arc<CacheStore>,
    source: Arc<dyn ContentSource>,
    sink: Option<Arc<dyn UserStateSink>>,
    /// Queue of the propagation worker, started on first use
    outbox: Arc<OnceLock<mpsc::UnboundedSender<Mutation>>>,
    connectivity: Arc<dyn Connectivity>,
    chapter_flights: SingleFlight<Fresh<Vec<Chapter>>, FetchError>,
    verse_flights: SingleFlight<FetchedPage, FetchError>,
    refresh_flights: SingleFlight<Fresh<Vec<Verse>>, FetchError>,
    translation_flights: SingleFlight<Fresh<Vec<Translation>>, FetchError>,
    page_size: u32,
    events: broadcast::Sender<RepositoryEvent>,
}

impl Repository {
    /// Create a repository over a cache and a content source
    pub fn new(store: CacheStore, source: Arc<dyn ContentSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: Arc::new(store),
            source,
            sink: None,
            outbox: Arc::new(OnceLock::new()),
            connectivity: Arc::new(AlwaysOnline),
            chapter_flights: SingleFlight::new(),
            verse_flights: SingleFlight::new(),
            refresh_flights: SingleFlight::new(),
            translation_flights: SingleFlight::new(),
            page_size: DEFAULT_PAGE_SIZE,
            events,
        }
    }

    /// Open the repository described by the configuration
    ///
    /// Without a configured server the repository starts offline and serves
    /// the cache only.
    pub fn open(config: &Config) -> RepositoryResult<Self> {
        let store = CacheStore::open(config)?;

        let repo = match HttpContentClient::from_config(config) {
            Some(client) => {
                let client = Arc::new(client);
                let repo = Self::new(store, client.clone());
                if config.sync_user_state {
                    repo.with_user_state_sink(client)
                } else {
                    repo
                }
            }
            None => {
                debug!("No content server configured, starting offline");
                Self::new(store, Arc::new(Disconnected))
                    .with_connectivity(Arc::new(ConnectivitySignal::new(false)))
            }
        };

        Ok(repo.with_page_size(config.page_size))
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Propagate user mutations to a remote endpoint
    pub fn with_user_state_sink(mut self, sink: Arc<dyn UserStateSink>) -> Self {
        self.sink = Some(sink);
        self.outbox = Arc::new(OnceLock::new());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Whether a mutation made now would be pushed to the server
    pub fn propagates_mutations(&self) -> bool {
        self.sink.is_some() && self.is_online()
    }

    /// Receive repository events from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    // ==================== Reference reads ====================

    /// Get the chapter catalog
    pub async fn get_chapters(&self) -> RepositoryResult<CacheEntry<Vec<Chapter>>> {
        if self.is_online() {
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);

            match self
                .chapter_flights
                .execute(CHAPTERS_KEY, move || fetch_chapters(source, store))
                .await
            {
                Ok(fresh) => return Ok(CacheEntry::network(fresh.value, fresh.fetched_at)),
                Err(e) => self.fell_back("chapters", &e),
            }
        } else {
            debug!("Offline, reading chapters from cache");
        }

        blocking(&self.store, |s| s.get_chapters())
            .await?
            .ok_or_else(|| RepositoryError::unavailable("chapters"))
    }

    /// Get the translation catalog
    pub async fn get_translations(&self) -> RepositoryResult<CacheEntry<Vec<Translation>>> {
        if self.is_online() {
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);

            match self
                .translation_flights
                .execute(TRANSLATIONS_KEY, move || fetch_translations(source, store))
                .await
            {
                Ok(fresh) => return Ok(CacheEntry::network(fresh.value, fresh.fetched_at)),
                Err(e) => self.fell_back("translations", &e),
            }
        } else {
            debug!("Offline, reading translations from cache");
        }

        blocking(&self.store, |s| s.get_translations())
            .await?
            .ok_or_else(|| RepositoryError::unavailable("translations"))
    }

    /// Get one page of a chapter's verses
    ///
    /// `cursor` is `None` for the first page, otherwise the `next_cursor` of
    /// the previous page.
    pub async fn get_verses_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
    ) -> RepositoryResult<CacheEntry<VersesPage>> {
        check_verse_request(chapter_id, translation_id)?;
        let chapter = self.find_chapter(chapter_id).await?;
        let resource = format!("verses of chapter {} ({})", chapter_id, translation_id);

        let state = self.verse_set(chapter_id, translation_id).await?;
        if state.as_ref().is_some_and(|s| s.complete) {
            if let Some(entry) = self.cached_page(chapter_id, translation_id, cursor).await? {
                debug!(chapter_id, translation_id, "Serving complete chapter from cache");
                return Ok(entry);
            }
        }

        if self.is_online() {
            match self
                .fetch_verses(&chapter, translation_id, cursor.map(String::from))
                .await
            {
                Ok(fetched) => return Ok(CacheEntry::network(fetched.page, fetched.fetched_at)),
                Err(e) => self.fell_back(&resource, &e),
            }
        } else {
            debug!(chapter_id, translation_id, "Offline, reading verses from cache");
        }

        self.cached_page(chapter_id, translation_id, cursor)
            .await?
            .ok_or_else(|| RepositoryError::unavailable(resource))
    }

    /// Fetch every missing page of a chapter for offline reading
    ///
    /// Resumes from the stored page cursor. Pages already cached are not
    /// fetched again.
    pub async fn download_chapter(
        &self,
        chapter_id: u16,
        translation_id: &str,
    ) -> RepositoryResult<DownloadReport> {
        check_verse_request(chapter_id, translation_id)?;
        let chapter = self.find_chapter(chapter_id).await?;
        let resource = format!("verses of chapter {} ({})", chapter_id, translation_id);

        let state = self.verse_set(chapter_id, translation_id).await?;
        let mut report = DownloadReport {
            pages: 0,
            inserted: 0,
            cached_verses: state.as_ref().map_or(0, |s| s.cached_verses),
            verse_count: chapter.verse_count,
            complete: state.as_ref().is_some_and(|s| s.complete),
        };

        if report.complete {
            debug!(chapter_id, translation_id, "Chapter already downloaded");
            return Ok(report);
        }
        if !self.is_online() {
            return Err(RepositoryError::unavailable(resource));
        }

        let mut cursor = state.and_then(|s| s.cursor.next_cursor);
        if let Some(resume) = &cursor {
            info!(chapter_id, translation_id, cursor = %resume, "Resuming chapter download");
        }

        // Every useful page adds at least one verse, which bounds the walk
        for _ in 0..=chapter.verse_count {
            let fetched = match self.fetch_verses(&chapter, translation_id, cursor.clone()).await {
                Ok(fetched) => fetched,
                Err(e) if report.pages == 0 => {
                    self.fell_back(&resource, &e);
                    return Err(RepositoryError::unavailable(resource));
                }
                Err(e) => {
                    warn!(
                        chapter_id,
                        translation_id,
                        kind = e.kind(),
                        error = %e,
                        "Chapter download interrupted"
                    );
                    break;
                }
            };

            report.pages += 1;
            report.inserted += fetched.merged.inserted;
            report.cached_verses = fetched.merged.total;
            report.complete = fetched.merged.complete;

            if fetched.merged.inserted == 0 && !report.complete {
                warn!(chapter_id, translation_id, ?cursor, "Page added no verses, stopping");
                break;
            }

            let next = fetched.page.next_cursor;
            if report.complete || next.is_none() || next == cursor {
                break;
            }
            cursor = next;
        }

        info!(
            chapter_id,
            translation_id,
            pages = report.pages,
            cached = report.cached_verses,
            complete = report.complete,
            "Chapter download finished"
        );
        Ok(report)
    }

    /// Re-fetch a whole chapter and replace its cached verse set
    ///
    /// The cached set is replaced only when every verse was fetched and
    /// validated; otherwise the previous set is served unchanged.
    pub async fn refresh_chapter(
        &self,
        chapter_id: u16,
        translation_id: &str,
    ) -> RepositoryResult<CacheEntry<Vec<Verse>>> {
        check_verse_request(chapter_id, translation_id)?;
        let chapter = self.find_chapter(chapter_id).await?;
        let resource = format!("verses of chapter {} ({})", chapter_id, translation_id);

        if self.is_online() {
            let key = format!("verses:{}:{}:*", chapter_id, translation_id);
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);
            let translation = translation_id.to_string();
            let page_size = self.page_size;

            match self
                .refresh_flights
                .execute(&key, move || {
                    fetch_whole_chapter(source, store, chapter, translation, page_size)
                })
                .await
            {
                Ok(fresh) => {
                    let verses = fresh.value.len();
                    info!(chapter_id, translation_id, verses, "Chapter refreshed");
                    return Ok(CacheEntry::network(fresh.value, fresh.fetched_at));
                }
                Err(e) => self.fell_back(&resource, &e),
            }
        }

        let state = self.verse_set(chapter_id, translation_id).await?;
        let translation = translation_id.to_string();
        let verses = blocking(&self.store, move |s| {
            s.get_chapter_verses(chapter_id, &translation)
        })
        .await?;

        match state {
            Some(state) if !verses.is_empty() => Ok(CacheEntry::cached(verses, state.fetched_at)),
            _ => Err(RepositoryError::unavailable(resource)),
        }
    }

    /// Cached state of a (chapter, translation) verse set
    pub async fn verse_set(
        &self,
        chapter_id: u16,
        translation_id: &str,
    ) -> RepositoryResult<Option<VerseSetState>> {
        let translation = translation_id.to_string();
        Ok(blocking(&self.store, move |s| s.verse_set(chapter_id, &translation)).await?)
    }

    // ==================== Maintenance ====================

    /// Evict cached reference content; bookmarks and last-read are kept
    pub async fn clear_cache(&self) -> RepositoryResult<()> {
        blocking(&self.store, |s| s.clear_reference_data()).await?;
        info!("Cleared cached reference content");
        Ok(())
    }

    pub async fn cache_stats(&self) -> RepositoryResult<CacheStats> {
        Ok(blocking(&self.store, |s| s.stats()).await?)
    }

    // ==================== User state ====================

    /// Bookmark a verse; re-adding an existing bookmark changes nothing
    pub async fn add_bookmark(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> RepositoryResult<Bookmark> {
        self.check_position(user_id, chapter_id, verse_number).await?;

        let bookmark = Bookmark::new(user_id, chapter_id, verse_number);
        let (stored, inserted) = blocking(&self.store, move |s| s.add_bookmark(&bookmark)).await?;

        if inserted {
            debug!(user_id, key = %stored.verse_key(), "Bookmark added");
            self.propagate(Mutation::PutBookmark(stored.clone()));
        }
        Ok(stored)
    }

    /// Remove a bookmark; returns whether one existed
    pub async fn remove_bookmark(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> RepositoryResult<bool> {
        self.check_position(user_id, chapter_id, verse_number).await?;

        let user = user_id.to_string();
        let removed = blocking(&self.store, move |s| {
            s.remove_bookmark(&user, chapter_id, verse_number)
        })
        .await?;

        if removed {
            self.propagate(Mutation::DeleteBookmark {
                user_id: user_id.to_string(),
                chapter_id,
                verse_number,
            });
        }
        Ok(removed)
    }

    pub async fn list_bookmarks(&self, user_id: &str) -> RepositoryResult<Vec<Bookmark>> {
        let user = user_id.to_string();
        Ok(blocking(&self.store, move |s| s.list_bookmarks(&user)).await?)
    }

    /// Record a last-read position
    ///
    /// Returns `false` when a newer position was already stored.
    pub async fn save_last_read(&self, position: LastReadPosition) -> RepositoryResult<bool> {
        self.check_position(&position.user_id, position.chapter_id, position.verse_number)
            .await?;

        let to_store = position.clone();
        let applied = blocking(&self.store, move |s| s.save_last_read(&to_store)).await?;

        if applied {
            self.propagate(Mutation::PutLastRead(position));
        } else {
            debug!(user_id = %position.user_id, "Ignoring older last-read position");
        }
        Ok(applied)
    }

    pub async fn get_last_read(&self, user_id: &str) -> RepositoryResult<Option<LastReadPosition>> {
        let user = user_id.to_string();
        Ok(blocking(&self.store, move |s| s.get_last_read(&user)).await?)
    }

    // ==================== Internals ====================

    /// Resolve a chapter from cache, falling back to the catalog read path
    async fn find_chapter(&self, chapter_id: u16) -> RepositoryResult<Chapter> {
        if let Some(chapter) = blocking(&self.store, move |s| s.get_chapter(chapter_id)).await? {
            return Ok(chapter);
        }

        let unavailable = || RepositoryError::unavailable(format!("chapter {}", chapter_id));
        let catalog = match self.get_chapters().await {
            Ok(catalog) => catalog,
            Err(e) if e.is_content_unavailable() => return Err(unavailable()),
            Err(e) => return Err(e),
        };

        catalog
            .data
            .into_iter()
            .find(|c| c.id == chapter_id)
            .ok_or_else(unavailable)
    }

    async fn cached_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
    ) -> RepositoryResult<Option<CacheEntry<VersesPage>>> {
        let translation = translation_id.to_string();
        let cursor = cursor.map(String::from);
        Ok(blocking(&self.store, move |s| {
            s.get_verses_page(chapter_id, &translation, cursor.as_deref())
        })
        .await?)
    }

    /// Fetch and merge one page, coalesced per (chapter, translation, cursor)
    async fn fetch_verses(
        &self,
        chapter: &Chapter,
        translation_id: &str,
        cursor: Option<String>,
    ) -> Result<FetchedPage, FetchError> {
        let key = format!(
            "verses:{}:{}:{}",
            chapter.id,
            translation_id,
            cursor.as_deref().unwrap_or("")
        );
        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);
        let chapter = chapter.clone();
        let translation = translation_id.to_string();
        let page_size = self.page_size;

        self.verse_flights
            .execute(&key, move || {
                fetch_verses_page(source, store, chapter, translation, cursor, page_size)
            })
            .await
    }

    async fn check_position(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> RepositoryResult<()> {
        if user_id.trim().is_empty() {
            return Err(RepositoryError::InvalidArgument("user id cannot be empty".into()));
        }
        check_chapter_id(chapter_id)?;
        if verse_number == 0 {
            return Err(RepositoryError::InvalidArgument("verse numbers start at 1".into()));
        }

        if let Some(chapter) = blocking(&self.store, move |s| s.get_chapter(chapter_id)).await? {
            if verse_number > chapter.verse_count {
                return Err(RepositoryError::InvalidArgument(format!(
                    "chapter {} has {} verses, got verse {}",
                    chapter_id, chapter.verse_count, verse_number
                )));
            }
        }
        Ok(())
    }

    fn fell_back(&self, resource: &str, error: &FetchError) {
        warn!(
            resource,
            kind = error.kind(),
            error = %error,
            "Network refresh failed, falling back to cache"
        );
        // No subscribers is fine
        let _ = self.events.send(RepositoryEvent::FellBack {
            resource: resource.to_string(),
            kind: error.kind(),
            reason: error.to_string(),
        });
    }

    /// Queue a committed mutation for the propagation worker
    fn propagate(&self, mutation: Mutation) {
        let Some(sink) = &self.sink else {
            return;
        };
        if !self.is_online() {
            debug!(mutation = %mutation.describe(), "Offline, not propagating");
            return;
        }

        let outbox = self
            .outbox
            .get_or_init(|| spawn_propagation_worker(Arc::clone(sink), self.events.clone()));
        if let Err(mpsc::error::SendError(mutation)) = outbox.send(mutation) {
            warn!(mutation = %mutation.describe(), "Propagation worker stopped, not pushed");
        }
    }
}

/// Start the worker that pushes mutations one at a time, in commit order
fn spawn_propagation_worker(
    sink: Arc<dyn UserStateSink>,
    events: broadcast::Sender<RepositoryEvent>,
) -> mpsc::UnboundedSender<Mutation> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Mutation>();

    tokio::spawn(async move {
        while let Some(mutation) = rx.recv().await {
            let description = mutation.describe();
            // No subscribers is fine
            match mutation.push(sink.as_ref()).await {
                Ok(()) => {
                    debug!(mutation = %description, "Propagated");
                    let _ = events.send(RepositoryEvent::Propagated {
                        mutation: description,
                    });
                }
                Err(source) => {
                    let failure = MutationPropagationFailed {
                        mutation: description,
                        source,
                    };
                    warn!("{}", failure);
                    let _ = events.send(RepositoryEvent::PropagationFailed(failure));
                }
            }
        }
        debug!("Propagation worker finished");
    });

    tx
}

// ==================== Producers ====================
//
// Producers own everything they touch: they run as detached tasks and may
// outlive the caller that started them.

/// Run a store operation on the blocking pool
async fn blocking<R, F>(store: &Arc<CacheStore>, op: F) -> CacheResult<R>
where
    F: FnOnce(&CacheStore) -> CacheResult<R> + Send + 'static,
    R: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref())).await?
}

/// Write validated data through, logging failures before they become fallbacks
async fn write_through<R, F>(store: &Arc<CacheStore>, what: &str, op: F) -> Result<R, FetchError>
where
    F: FnOnce(&CacheStore) -> CacheResult<R> + Send + 'static,
    R: Send + 'static,
{
    blocking(store, op).await.map_err(|e| {
        error!(what, error = %e, "Cache write failed");
        FetchError::cache_write(e)
    })
}

async fn fetch_chapters(
    source: Arc<dyn ContentSource>,
    store: Arc<CacheStore>,
) -> Result<Fresh<Vec<Chapter>>, FetchError> {
    let raw = source.fetch_chapters().await?;
    let chapters = validate_chapters(&raw)?;

    let fetched_at = Utc::now();
    let to_store = chapters.clone();
    write_through(&store, "chapters", move |s| s.put_chapters(&to_store, fetched_at)).await?;

    info!(count = chapters.len(), "Refreshed chapter catalog");
    Ok(Fresh {
        value: chapters,
        fetched_at,
    })
}

async fn fetch_translations(
    source: Arc<dyn ContentSource>,
    store: Arc<CacheStore>,
) -> Result<Fresh<Vec<Translation>>, FetchError> {
    let raw = source.fetch_translations().await?;
    let translations = validate_translations(&raw)?;

    let fetched_at = Utc::now();
    let to_store = translations.clone();
    write_through(&store, "translations", move |s| {
        s.put_translations(&to_store, fetched_at)
    })
    .await?;

    info!(count = translations.len(), "Refreshed translation catalog");
    Ok(Fresh {
        value: translations,
        fetched_at,
    })
}

async fn fetch_verses_page(
    source: Arc<dyn ContentSource>,
    store: Arc<CacheStore>,
    chapter: Chapter,
    translation_id: String,
    cursor: Option<String>,
    page_size: u32,
) -> Result<FetchedPage, FetchError> {
    let raw = source
        .fetch_verses_page(chapter.id, &translation_id, cursor.as_deref(), page_size)
        .await?;
    let page = validate_verses_page(&raw, chapter.id, Some(chapter.verse_count))?;

    let fetched_at = Utc::now();
    let to_merge = page.clone();
    let merged = write_through(&store, "verse page", move |s| {
        s.merge_verses_page(chapter.id, &translation_id, cursor.as_deref(), &to_merge, fetched_at)
    })
    .await?;

    Ok(FetchedPage {
        page,
        merged,
        fetched_at,
    })
}

/// Fetch every page of a chapter into memory, then replace the cached set
async fn fetch_whole_chapter(
    source: Arc<dyn ContentSource>,
    store: Arc<CacheStore>,
    chapter: Chapter,
    translation_id: String,
    page_size: u32,
) -> Result<Fresh<Vec<Verse>>, FetchError> {
    let mut verses = BTreeMap::new();
    let mut cursor: Option<String> = None;

    // Every page must add at least one verse, which bounds the walk
    for _ in 0..=chapter.verse_count {
        let raw = source
            .fetch_verses_page(chapter.id, &translation_id, cursor.as_deref(), page_size)
            .await?;
        let page = validate_verses_page(&raw, chapter.id, Some(chapter.verse_count))?;

        let before = verses.len();
        for verse in page.verses {
            verses.entry(verse.verse_number).or_insert(verse);
        }

        match page.next_cursor {
            Some(next) if verses.len() > before && Some(&next) != cursor.as_ref() => {
                cursor = Some(next)
            }
            _ => break,
        }
    }

    if verses.len() != usize::from(chapter.verse_count) {
        return Err(SchemaMismatch::new(
            "verses",
            format!(
                "chapter {} returned {} of {} verses",
                chapter.id,
                verses.len(),
                chapter.verse_count
            ),
        )
        .into());
    }

    let verses: Vec<Verse> = verses.into_values().collect();
    let fetched_at = Utc::now();
    let to_store = verses.clone();
    write_through(&store, "chapter verses", move |s| {
        s.put_verses_for_chapter(chapter.id, &translation_id, &to_store, fetched_at)
    })
    .await?;

    Ok(Fresh {
        value: verses,
        fetched_at,
    })
}

fn check_chapter_id(chapter_id: u16) -> RepositoryResult<()> {
    if !is_valid_chapter_id(chapter_id) {
        return Err(RepositoryError::InvalidArgument(format!(
            "chapter {} is outside 1..={}",
            chapter_id, CHAPTER_COUNT
        )));
    }
    Ok(())
}

fn check_verse_request(chapter_id: u16, translation_id: &str) -> RepositoryResult<()> {
    check_chapter_id(chapter_id)?;
    if translation_id.trim().is_empty() {
        return Err(RepositoryError::InvalidArgument(
            "translation id cannot be empty".into(),
        ));
    }
    Ok(())
}
