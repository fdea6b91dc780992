//! SQLite schema for the content cache
//!
//! Reference tables (chapters, translations, verse sets) carry a `fetched_at`
//! timestamp in milliseconds. User tables (bookmarks, last_read) have no
//! foreign keys into reference tables so they survive eviction and refresh.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Chapter catalog
        CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY CHECK (id BETWEEN 1 AND 114),
            name TEXT NOT NULL,
            native_name TEXT NOT NULL,
            verse_count INTEGER NOT NULL CHECK (verse_count >= 1),
            revelation_place TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        );

        -- Translation catalog
        CREATE TABLE IF NOT EXISTS translations (
            id TEXT PRIMARY KEY,
            language TEXT NOT NULL,
            name TEXT NOT NULL,
            author TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        );

        -- One row per cached (chapter, translation) pair; doubles as the page cursor
        CREATE TABLE IF NOT EXISTS verse_sets (
            chapter_id INTEGER NOT NULL,
            translation_id TEXT NOT NULL,
            complete INTEGER NOT NULL DEFAULT 0,
            next_cursor TEXT,
            highest_verse INTEGER NOT NULL DEFAULT 0,
            fetched_at INTEGER NOT NULL,
            PRIMARY KEY (chapter_id, translation_id),
            FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE
        );

        -- Verses of a cached set
        CREATE TABLE IF NOT EXISTS verses (
            chapter_id INTEGER NOT NULL,
            translation_id TEXT NOT NULL,
            verse_number INTEGER NOT NULL CHECK (verse_number >= 1),
            text TEXT NOT NULL,
            juz INTEGER NOT NULL,
            hizb INTEGER NOT NULL,
            page INTEGER NOT NULL,
            renderings TEXT NOT NULL,
            PRIMARY KEY (chapter_id, translation_id, verse_number),
            FOREIGN KEY (chapter_id, translation_id)
                REFERENCES verse_sets(chapter_id, translation_id) ON DELETE CASCADE
        );

        -- Pages as the server returned them, keyed by the cursor that requested them
        CREATE TABLE IF NOT EXISTS verse_pages (
            chapter_id INTEGER NOT NULL,
            translation_id TEXT NOT NULL,
            cursor TEXT NOT NULL,
            first_verse INTEGER NOT NULL,
            last_verse INTEGER NOT NULL,
            next_cursor TEXT,
            PRIMARY KEY (chapter_id, translation_id, cursor),
            FOREIGN KEY (chapter_id, translation_id)
                REFERENCES verse_sets(chapter_id, translation_id) ON DELETE CASCADE
        );

        -- User bookmarks (local-first)
        CREATE TABLE IF NOT EXISTS bookmarks (
            user_id TEXT NOT NULL,
            chapter_id INTEGER NOT NULL,
            verse_number INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, chapter_id, verse_number)
        );

        -- Last-read position, one row per user
        CREATE TABLE IF NOT EXISTS last_read (
            user_id TEXT PRIMARY KEY,
            chapter_id INTEGER NOT NULL,
            verse_number INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Indexes for common query patterns
        CREATE INDEX IF NOT EXISTS idx_verse_sets_translation ON verse_sets(translation_id);
        CREATE INDEX IF NOT EXISTS idx_bookmarks_created_at ON bookmarks(user_id, created_at);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "chapters",
            "translations",
            "verse_sets",
            "verses",
            "verse_pages",
            "bookmarks",
            "last_read",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_chapter_bounds_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO chapters (id, name, native_name, verse_count, revelation_place, fetched_at)
             VALUES (115, 'x', 'x', 1, 'makkah', 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(indexes.contains(&"idx_verse_sets_translation".to_string()));
        assert!(indexes.contains(&"idx_bookmarks_created_at".to_string()));
    }
}
