//! SQLite content cache
//!
//! Durable store for reference content and user state. Every multi-row write
//! runs inside one transaction, so an interrupted write leaves either the old
//! rows or the new rows visible, never a mix.
//!
//! ## Tables
//!
//! - `chapters`, `translations` - catalogs, replaced wholesale
//! - `verse_sets` - one row per (chapter, translation): completeness and page cursor
//! - `verses` - verses of a set, unique per verse number
//! - `verse_pages` - server pages keyed by the cursor that requested them
//! - `bookmarks`, `last_read` - user state, untouched by reference refreshes

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use tracing::debug;

use super::error::{CacheError, CacheResult};
use super::schema::{init_schema, needs_init};
use crate::config::Config;
use crate::models::{
    Bookmark, CacheEntry, Chapter, LastReadPosition, PageCursor, RevelationPlace, Translation,
    TranslationRendering, Verse, VerseMetadata, VerseSetState, VersesPage,
};

/// Row counts, for status output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub chapters: i64,
    pub translations: i64,
    pub verse_sets: i64,
    pub complete_verse_sets: i64,
    pub verses: i64,
    pub bookmarks: i64,
    pub last_read: i64,
}

/// Result of merging one page of verses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Verses that were not cached before
    pub inserted: usize,
    /// Verses cached for the pair after the merge
    pub total: u16,
    pub complete: bool,
}

/// Durable content cache
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    /// Open or create the cache database described by the configuration
    pub fn open(config: &Config) -> CacheResult<Self> {
        Self::open_at(&config.cache_db_path())
    }

    /// Open or create the cache database at a specific path
    pub fn open_at(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        // Cascades from chapters to verse sets rely on this
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Make every write on this connection fail, as a full or read-only disk would
    #[cfg(test)]
    pub(crate) fn set_query_only(&self, on: bool) -> CacheResult<()> {
        let conn = self.lock()?;
        let pragma = if on { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA query_only = {};", pragma))?;
        Ok(())
    }

    // ==================== Chapters ====================

    /// Get the cached chapter catalog, ordered by id
    pub fn get_chapters(&self) -> CacheResult<Option<CacheEntry<Vec<Chapter>>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, native_name, verse_count, revelation_place, fetched_at
             FROM chapters ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| Ok((read_chapter(row)?, row.get::<_, i64>(5)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let Some(fetched_at) = rows.iter().map(|(_, at)| *at).min() else {
            return Ok(None);
        };
        let chapters = rows.into_iter().map(|(chapter, _)| chapter).collect();

        Ok(Some(CacheEntry::cached(chapters, from_millis(fetched_at))))
    }

    /// Get a single cached chapter
    pub fn get_chapter(&self, id: u16) -> CacheResult<Option<Chapter>> {
        let conn = self.lock()?;
        let chapter = conn
            .query_row(
                "SELECT id, name, native_name, verse_count, revelation_place
                 FROM chapters WHERE id = ?",
                params![id],
                read_chapter,
            )
            .optional()?;
        Ok(chapter)
    }

    /// Replace the chapter catalog
    ///
    /// Chapters missing from the new catalog are removed along with their
    /// verses. Chapters whose verse count changed lose their cached verse sets.
    pub fn put_chapters(&self, chapters: &[Chapter], fetched_at: DateTime<Utc>) -> CacheResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CacheError::write_failed("chapter catalog", e))?;

        write_chapters(&tx, chapters, to_millis(fetched_at))
            .and_then(|_| tx.commit())
            .map_err(|e| CacheError::write_failed("chapter catalog", e))?;

        debug!(count = chapters.len(), "Stored chapter catalog");
        Ok(())
    }

    // ==================== Verses ====================

    /// Get the cached state of a (chapter, translation) verse set
    pub fn verse_set(
        &self,
        chapter_id: u16,
        translation_id: &str,
    ) -> CacheResult<Option<VerseSetState>> {
        let conn = self.lock()?;
        read_verse_set(&conn, chapter_id, translation_id)
    }

    /// Get the pagination resume point for a (chapter, translation) pair
    pub fn page_cursor(
        &self,
        chapter_id: u16,
        translation_id: &str,
    ) -> CacheResult<Option<PageCursor>> {
        Ok(self
            .verse_set(chapter_id, translation_id)?
            .map(|state| state.cursor))
    }

    /// Get a cached page of verses
    ///
    /// A page recorded for `cursor` is served with its recorded next cursor.
    /// Without a record, a complete set is served whole, whatever the cursor.
    /// Anything else is absent.
    pub fn get_verses_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
    ) -> CacheResult<Option<CacheEntry<VersesPage>>> {
        let conn = self.lock()?;

        let Some(state) = read_verse_set(&conn, chapter_id, translation_id)? else {
            return Ok(None);
        };

        let record: Option<(u16, u16, Option<String>)> = conn
            .query_row(
                "SELECT first_verse, last_verse, next_cursor FROM verse_pages
                 WHERE chapter_id = ? AND translation_id = ? AND cursor = ?",
                params![chapter_id, translation_id, cursor.unwrap_or("")],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (verses, next_cursor) = match record {
            Some((first, last, next)) => (
                read_verses(&conn, chapter_id, translation_id, first, last)?,
                next,
            ),
            None if state.complete => (
                read_verses(&conn, chapter_id, translation_id, 1, u16::MAX)?,
                None,
            ),
            None => return Ok(None),
        };

        if verses.is_empty() {
            return Ok(None);
        }

        Ok(Some(CacheEntry::cached(
            VersesPage {
                verses,
                next_cursor,
            },
            state.fetched_at,
        )))
    }

    /// Get every cached verse of a (chapter, translation) pair
    pub fn get_chapter_verses(
        &self,
        chapter_id: u16,
        translation_id: &str,
    ) -> CacheResult<Vec<Verse>> {
        let conn = self.lock()?;
        read_verses(&conn, chapter_id, translation_id, 1, u16::MAX)
    }

    /// Atomically replace the verse set of a (chapter, translation) pair
    ///
    /// Returns whether the stored set is complete.
    pub fn put_verses_for_chapter(
        &self,
        chapter_id: u16,
        translation_id: &str,
        verses: &[Verse],
        fetched_at: DateTime<Utc>,
    ) -> CacheResult<bool> {
        let mut conn = self.lock()?;
        let verse_count = require_chapter(&conn, chapter_id)?;
        let what = format!("verses of chapter {} ({})", chapter_id, translation_id);

        let tx = conn
            .transaction()
            .map_err(|e| CacheError::write_failed(&what, e))?;

        let complete = replace_verse_set(
            &tx,
            chapter_id,
            translation_id,
            verses,
            verse_count,
            to_millis(fetched_at),
        )
        .map_err(|e| CacheError::write_failed(&what, e))?;

        tx.commit().map_err(|e| CacheError::write_failed(&what, e))?;

        debug!(chapter_id, translation_id, complete, "Replaced verse set");
        Ok(complete)
    }

    /// Merge one server page into a (chapter, translation) verse set
    ///
    /// Verse numbers already cached are kept as they are, so overlapping or
    /// repeated pages never duplicate verses. A complete set is left alone.
    pub fn merge_verses_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        request_cursor: Option<&str>,
        page: &VersesPage,
        fetched_at: DateTime<Utc>,
    ) -> CacheResult<MergeOutcome> {
        let mut conn = self.lock()?;
        let verse_count = require_chapter(&conn, chapter_id)?;
        let what = format!("verse page of chapter {} ({})", chapter_id, translation_id);

        let tx = conn
            .transaction()
            .map_err(|e| CacheError::write_failed(&what, e))?;

        let outcome = merge_page(
            &tx,
            chapter_id,
            translation_id,
            request_cursor.unwrap_or(""),
            page,
            verse_count,
            to_millis(fetched_at),
        )
        .map_err(|e| CacheError::write_failed(&what, e))?;

        tx.commit().map_err(|e| CacheError::write_failed(&what, e))?;

        debug!(
            chapter_id,
            translation_id,
            inserted = outcome.inserted,
            total = outcome.total,
            complete = outcome.complete,
            "Merged verse page"
        );
        Ok(outcome)
    }

    // ==================== Translations ====================

    /// Get the cached translation catalog, in stored order
    pub fn get_translations(&self) -> CacheResult<Option<CacheEntry<Vec<Translation>>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, language, name, author, fetched_at FROM translations ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    Translation {
                        id: row.get(0)?,
                        language: row.get(1)?,
                        name: row.get(2)?,
                        author: row.get(3)?,
                    },
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let Some(fetched_at) = rows.iter().map(|(_, at)| *at).min() else {
            return Ok(None);
        };
        let translations = rows.into_iter().map(|(t, _)| t).collect();

        Ok(Some(CacheEntry::cached(translations, from_millis(fetched_at))))
    }

    /// Replace the translation catalog
    pub fn put_translations(
        &self,
        translations: &[Translation],
        fetched_at: DateTime<Utc>,
    ) -> CacheResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CacheError::write_failed("translation catalog", e))?;

        write_translations(&tx, translations, to_millis(fetched_at))
            .and_then(|_| tx.commit())
            .map_err(|e| CacheError::write_failed("translation catalog", e))?;

        Ok(())
    }

    // ==================== Bookmarks ====================

    /// Add a bookmark unless one already exists for the same verse
    ///
    /// Returns the stored bookmark and whether it was newly created.
    pub fn add_bookmark(&self, bookmark: &Bookmark) -> CacheResult<(Bookmark, bool)> {
        let conn = self.lock()?;
        let what = format!("bookmark {}", bookmark.verse_key());

        let inserted = conn
            .execute(
                "INSERT INTO bookmarks (user_id, chapter_id, verse_number, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (user_id, chapter_id, verse_number) DO NOTHING",
                params![
                    bookmark.user_id,
                    bookmark.chapter_id,
                    bookmark.verse_number,
                    to_millis(bookmark.created_at)
                ],
            )
            .map_err(|e| CacheError::write_failed(&what, e))?
            > 0;

        let created_at: i64 = conn.query_row(
            "SELECT created_at FROM bookmarks
             WHERE user_id = ? AND chapter_id = ? AND verse_number = ?",
            params![bookmark.user_id, bookmark.chapter_id, bookmark.verse_number],
            |row| row.get(0),
        )?;

        let stored = Bookmark {
            created_at: from_millis(created_at),
            ..bookmark.clone()
        };
        Ok((stored, inserted))
    }

    /// Remove a bookmark; returns whether one existed
    pub fn remove_bookmark(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> CacheResult<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM bookmarks WHERE user_id = ? AND chapter_id = ? AND verse_number = ?",
                params![user_id, chapter_id, verse_number],
            )
            .map_err(|e| {
                CacheError::write_failed(format!("bookmark {}:{}", chapter_id, verse_number), e)
            })?;
        Ok(removed > 0)
    }

    /// List a user's bookmarks in reading order
    pub fn list_bookmarks(&self, user_id: &str) -> CacheResult<Vec<Bookmark>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, chapter_id, verse_number, created_at FROM bookmarks
             WHERE user_id = ? ORDER BY chapter_id, verse_number",
        )?;

        let bookmarks = stmt
            .query_map(params![user_id], |row| {
                Ok(Bookmark {
                    user_id: row.get(0)?,
                    chapter_id: row.get(1)?,
                    verse_number: row.get(2)?,
                    created_at: from_millis(row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bookmarks)
    }

    // ==================== Last read ====================

    /// Store a last-read position unless a newer one is already stored
    ///
    /// Returns whether the position was applied.
    pub fn save_last_read(&self, position: &LastReadPosition) -> CacheResult<bool> {
        let conn = self.lock()?;
        let applied = conn
            .execute(
                "INSERT INTO last_read (user_id, chapter_id, verse_number, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id) DO UPDATE SET
                     chapter_id = excluded.chapter_id,
                     verse_number = excluded.verse_number,
                     updated_at = excluded.updated_at
                 WHERE excluded.updated_at >= last_read.updated_at",
                params![
                    position.user_id,
                    position.chapter_id,
                    position.verse_number,
                    to_millis(position.updated_at)
                ],
            )
            .map_err(|e| CacheError::write_failed("last-read position", e))?;
        Ok(applied > 0)
    }

    /// Get a user's last-read position
    pub fn get_last_read(&self, user_id: &str) -> CacheResult<Option<LastReadPosition>> {
        let conn = self.lock()?;
        let position = conn
            .query_row(
                "SELECT user_id, chapter_id, verse_number, updated_at FROM last_read
                 WHERE user_id = ?",
                params![user_id],
                |row| {
                    Ok(LastReadPosition {
                        user_id: row.get(0)?,
                        chapter_id: row.get(1)?,
                        verse_number: row.get(2)?,
                        updated_at: from_millis(row.get(3)?),
                    })
                },
            )
            .optional()?;
        Ok(position)
    }

    // ==================== Maintenance ====================

    /// Evict all reference content; bookmarks and last-read rows are kept
    pub fn clear_reference_data(&self) -> CacheResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CacheError::write_failed("reference data eviction", e))?;

        tx.execute_batch(
            "DELETE FROM verse_sets;
             DELETE FROM chapters;
             DELETE FROM translations;",
        )
        .and_then(|_| tx.commit())
        .map_err(|e| CacheError::write_failed("reference data eviction", e))?;

        Ok(())
    }

    /// Row counts for every table
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.lock()?;
        let count =
            |sql: &str| -> CacheResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        Ok(CacheStats {
            chapters: count("SELECT COUNT(*) FROM chapters")?,
            translations: count("SELECT COUNT(*) FROM translations")?,
            verse_sets: count("SELECT COUNT(*) FROM verse_sets")?,
            complete_verse_sets: count("SELECT COUNT(*) FROM verse_sets WHERE complete = 1")?,
            verses: count("SELECT COUNT(*) FROM verses")?,
            bookmarks: count("SELECT COUNT(*) FROM bookmarks")?,
            last_read: count("SELECT COUNT(*) FROM last_read")?,
        })
    }
}

// ==================== Private helpers ====================

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn read_chapter(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    let place: String = row.get(4)?;
    let revelation_place = RevelationPlace::parse(&place)
        .ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(4, "revelation_place".into(), Type::Text)
        })?;

    Ok(Chapter {
        id: row.get(0)?,
        name: row.get(1)?,
        native_name: row.get(2)?,
        verse_count: row.get(3)?,
        revelation_place,
    })
}

/// Verse count of a cached chapter, or `NotFound` if the chapter is absent
fn require_chapter(conn: &Connection, chapter_id: u16) -> CacheResult<u16> {
    conn.query_row(
        "SELECT verse_count FROM chapters WHERE id = ?",
        params![chapter_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| CacheError::NotFound {
        what: format!("chapter {}", chapter_id),
    })
}

fn read_verse_set(
    conn: &Connection,
    chapter_id: u16,
    translation_id: &str,
) -> CacheResult<Option<VerseSetState>> {
    let row: Option<(bool, Option<String>, u16, i64, u16)> = conn
        .query_row(
            "SELECT vs.complete, vs.next_cursor, vs.highest_verse, vs.fetched_at, c.verse_count
             FROM verse_sets vs JOIN chapters c ON c.id = vs.chapter_id
             WHERE vs.chapter_id = ? AND vs.translation_id = ?",
            params![chapter_id, translation_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;

    let Some((complete, next_cursor, highest_verse, fetched_at, chapter_verse_count)) = row else {
        return Ok(None);
    };

    let cached_verses = count_verses(conn, chapter_id, translation_id)?;

    Ok(Some(VerseSetState {
        cached_verses,
        chapter_verse_count,
        complete,
        fetched_at: from_millis(fetched_at),
        cursor: PageCursor {
            chapter_id,
            translation_id: translation_id.to_string(),
            next_cursor,
            highest_verse,
        },
    }))
}

fn count_verses(conn: &Connection, chapter_id: u16, translation_id: &str) -> rusqlite::Result<u16> {
    conn.query_row(
        "SELECT COUNT(*) FROM verses WHERE chapter_id = ? AND translation_id = ?",
        params![chapter_id, translation_id],
        |row| row.get(0),
    )
}

fn read_verses(
    conn: &Connection,
    chapter_id: u16,
    translation_id: &str,
    first: u16,
    last: u16,
) -> CacheResult<Vec<Verse>> {
    let mut stmt = conn.prepare(
        "SELECT verse_number, text, juz, hizb, page, renderings FROM verses
         WHERE chapter_id = ? AND translation_id = ? AND verse_number BETWEEN ? AND ?
         ORDER BY verse_number",
    )?;

    let rows = stmt
        .query_map(params![chapter_id, translation_id, first, last], |row| {
            Ok((
                row.get::<_, u16>(0)?,
                row.get::<_, String>(1)?,
                VerseMetadata {
                    juz: row.get(2)?,
                    hizb: row.get(3)?,
                    page: row.get(4)?,
                },
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(verse_number, text, metadata, renderings)| {
            let translations: Vec<TranslationRendering> = serde_json::from_str(&renderings)?;
            Ok(Verse {
                chapter_id,
                verse_number,
                text,
                metadata,
                translations,
            })
        })
        .collect()
}

fn write_chapters(
    tx: &Transaction<'_>,
    chapters: &[Chapter],
    fetched_at: i64,
) -> rusqlite::Result<()> {
    let keep: HashSet<u16> = chapters.iter().map(|c| c.id).collect();

    // Drop chapters that left the catalog (verse sets cascade)
    let existing: Vec<u16> = tx
        .prepare("SELECT id FROM chapters")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    for id in existing.into_iter().filter(|id| !keep.contains(id)) {
        tx.execute("DELETE FROM chapters WHERE id = ?", params![id])?;
    }

    // A changed verse count invalidates cached verse sets
    let mut lookup = tx.prepare("SELECT verse_count FROM chapters WHERE id = ?")?;
    let mut drop_sets = tx.prepare("DELETE FROM verse_sets WHERE chapter_id = ?")?;
    let mut upsert = tx.prepare(
        "INSERT INTO chapters (id, name, native_name, verse_count, revelation_place, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
             name = excluded.name,
             native_name = excluded.native_name,
             verse_count = excluded.verse_count,
             revelation_place = excluded.revelation_place,
             fetched_at = excluded.fetched_at",
    )?;

    for chapter in chapters {
        let previous: Option<u16> = lookup
            .query_row(params![chapter.id], |row| row.get(0))
            .optional()?;
        if matches!(previous, Some(count) if count != chapter.verse_count) {
            drop_sets.execute(params![chapter.id])?;
        }

        upsert.execute(params![
            chapter.id,
            chapter.name,
            chapter.native_name,
            chapter.verse_count,
            chapter.revelation_place.as_str(),
            fetched_at
        ])?;
    }

    Ok(())
}

fn write_translations(
    tx: &Transaction<'_>,
    translations: &[Translation],
    fetched_at: i64,
) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM translations", [])?;

    let mut insert = tx.prepare(
        "INSERT INTO translations (id, language, name, author, fetched_at) VALUES (?, ?, ?, ?, ?)",
    )?;
    for t in translations {
        insert.execute(params![t.id, t.language, t.name, t.author, fetched_at])?;
    }
    Ok(())
}

fn insert_verse(
    tx: &Transaction<'_>,
    translation_id: &str,
    verse: &Verse,
    on_conflict: &str,
) -> rusqlite::Result<usize> {
    let renderings = serde_json::to_string(&verse.translations)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    tx.execute(
        &format!(
            "INSERT INTO verses
                 (chapter_id, translation_id, verse_number, text, juz, hizb, page, renderings)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) {}",
            on_conflict
        ),
        params![
            verse.chapter_id,
            translation_id,
            verse.verse_number,
            verse.text,
            verse.metadata.juz,
            verse.metadata.hizb,
            verse.metadata.page,
            renderings
        ],
    )
}

fn replace_verse_set(
    tx: &Transaction<'_>,
    chapter_id: u16,
    translation_id: &str,
    verses: &[Verse],
    verse_count: u16,
    fetched_at: i64,
) -> rusqlite::Result<bool> {
    // Cascades to verses and verse_pages
    tx.execute(
        "DELETE FROM verse_sets WHERE chapter_id = ? AND translation_id = ?",
        params![chapter_id, translation_id],
    )?;

    let mut ordered: Vec<&Verse> = verses.iter().collect();
    ordered.sort_by_key(|v| v.verse_number);
    ordered.dedup_by_key(|v| v.verse_number);

    let highest = ordered.last().map(|v| v.verse_number).unwrap_or(0);
    let complete = ordered.len() == usize::from(verse_count);

    tx.execute(
        "INSERT INTO verse_sets
             (chapter_id, translation_id, complete, next_cursor, highest_verse, fetched_at)
         VALUES (?, ?, ?, NULL, ?, ?)",
        params![chapter_id, translation_id, complete, highest, fetched_at],
    )?;

    for verse in &ordered {
        insert_verse(tx, translation_id, verse, "")?;
    }

    if let (Some(first), Some(last)) = (ordered.first(), ordered.last()) {
        tx.execute(
            "INSERT INTO verse_pages
                 (chapter_id, translation_id, cursor, first_verse, last_verse, next_cursor)
             VALUES (?, ?, '', ?, ?, NULL)",
            params![chapter_id, translation_id, first.verse_number, last.verse_number],
        )?;
    }

    Ok(complete)
}

fn merge_page(
    tx: &Transaction<'_>,
    chapter_id: u16,
    translation_id: &str,
    cursor_key: &str,
    page: &VersesPage,
    verse_count: u16,
    fetched_at: i64,
) -> rusqlite::Result<MergeOutcome> {
    let existing: Option<(bool, u16)> = tx
        .query_row(
            "SELECT complete, highest_verse FROM verse_sets
             WHERE chapter_id = ? AND translation_id = ?",
            params![chapter_id, translation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let previous_highest = match existing {
        Some((true, _)) => {
            return Ok(MergeOutcome {
                inserted: 0,
                total: count_verses(tx, chapter_id, translation_id)?,
                complete: true,
            });
        }
        Some((false, highest)) => highest,
        None => {
            tx.execute(
                "INSERT INTO verse_sets
                     (chapter_id, translation_id, complete, next_cursor, highest_verse, fetched_at)
                 VALUES (?, ?, 0, NULL, 0, ?)",
                params![chapter_id, translation_id, fetched_at],
            )?;
            0
        }
    };

    let mut inserted = 0;
    for verse in &page.verses {
        inserted += insert_verse(
            tx,
            translation_id,
            verse,
            "ON CONFLICT (chapter_id, translation_id, verse_number) DO NOTHING",
        )?;
    }

    if let (Some(first), Some(last)) = (page.lowest_verse(), page.highest_verse()) {
        tx.execute(
            "INSERT OR REPLACE INTO verse_pages
                 (chapter_id, translation_id, cursor, first_verse, last_verse, next_cursor)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![chapter_id, translation_id, cursor_key, first, last, page.next_cursor],
        )?;

        // The resume point only ever moves forward
        if last > previous_highest {
            tx.execute(
                "UPDATE verse_sets SET highest_verse = ?, next_cursor = ?
                 WHERE chapter_id = ? AND translation_id = ?",
                params![last, page.next_cursor, chapter_id, translation_id],
            )?;
        }
    }

    let total = count_verses(tx, chapter_id, translation_id)?;
    let complete = total == verse_count;

    tx.execute(
        "UPDATE verse_sets SET complete = ?, fetched_at = ?,
             next_cursor = CASE WHEN ? THEN NULL ELSE next_cursor END
         WHERE chapter_id = ? AND translation_id = ?",
        params![complete, fetched_at, complete, chapter_id, translation_id],
    )?;

    Ok(MergeOutcome {
        inserted,
        total,
        complete,
    })
}
