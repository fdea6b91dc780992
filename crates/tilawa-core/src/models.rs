//! Data models for Tilawa
//!
//! Reference data (chapters, verses, translations) is immutable once
//! ingested and only ever refreshed wholesale. User state (bookmarks,
//! last-read position) is mutable and owned by the local device.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of chapters in the mushaf
pub const CHAPTER_COUNT: u16 = 114;

/// Highest juz (part) index
pub const MAX_JUZ: u8 = 30;

/// Highest hizb index
pub const MAX_HIZB: u8 = 60;

/// Highest page index in the standard mushaf layout
pub const MAX_PAGE: u16 = 604;

/// Check that a chapter id is within 1..=114
pub fn is_valid_chapter_id(id: u16) -> bool {
    (1..=CHAPTER_COUNT).contains(&id)
}

/// Where a chapter was revealed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RevelationPlace {
    Makkah,
    Madinah,
}

impl RevelationPlace {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevelationPlace::Makkah => "makkah",
            RevelationPlace::Madinah => "madinah",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "makkah" | "meccan" | "makki" => Some(RevelationPlace::Makkah),
            "madinah" | "medinan" | "madani" => Some(RevelationPlace::Madinah),
            _ => None,
        }
    }
}

impl fmt::Display for RevelationPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chapter (surah)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    /// Stable ordering key, 1..=114
    pub id: u16,
    /// Transliterated display name
    pub name: String,
    /// Name in the native script
    pub native_name: String,
    /// Number of verses in the chapter
    pub verse_count: u16,
    pub revelation_place: RevelationPlace,
}

/// Indices of the structural units containing a verse
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerseMetadata {
    pub juz: u8,
    pub hizb: u8,
    pub page: u16,
}

/// One translation's rendering of a verse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslationRendering {
    pub translation_id: String,
    pub text: String,
}

/// A verse (ayah)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verse {
    pub chapter_id: u16,
    pub verse_number: u16,
    /// Native-script text
    pub text: String,
    pub metadata: VerseMetadata,
    pub translations: Vec<TranslationRendering>,
}

impl Verse {
    /// The conventional `chapter:verse` key
    pub fn key(&self) -> String {
        format!("{}:{}", self.chapter_id, self.verse_number)
    }

    /// Rendering for a given translation, if present
    pub fn rendering(&self, translation_id: &str) -> Option<&str> {
        self.translations
            .iter()
            .find(|t| t.translation_id == translation_id)
            .map(|t| t.text.as_str())
    }
}

/// An entry in the translation catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translation {
    pub id: String,
    pub language: String,
    pub name: String,
    pub author: String,
}

/// A page of verses plus the token for the following page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VersesPage {
    pub verses: Vec<Verse>,
    pub next_cursor: Option<String>,
}

impl VersesPage {
    /// Highest verse number on this page
    pub fn highest_verse(&self) -> Option<u16> {
        self.verses.iter().map(|v| v.verse_number).max()
    }

    /// Lowest verse number on this page
    pub fn lowest_verse(&self) -> Option<u16> {
        self.verses.iter().map(|v| v.verse_number).min()
    }
}

/// Where a result was served from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Network,
    Cache,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Network => f.write_str("network"),
            Source::Cache => f.write_str("cache"),
        }
    }
}

/// Freshness envelope returned to callers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub fetched_at: DateTime<Utc>,
    pub source: Source,
}

impl<T> CacheEntry<T> {
    /// Data that was just fetched from the network
    pub fn network(data: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            data,
            fetched_at,
            source: Source::Network,
        }
    }

    /// Data read back from the local cache
    pub fn cached(data: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            data,
            fetched_at,
            source: Source::Cache,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == Source::Cache
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            data: f(self.data),
            fetched_at: self.fetched_at,
            source: self.source,
        }
    }
}

/// A user's bookmark on a verse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub user_id: String,
    pub chapter_id: u16,
    pub verse_number: u16,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(user_id: impl Into<String>, chapter_id: u16, verse_number: u16) -> Self {
        Self {
            user_id: user_id.into(),
            chapter_id,
            verse_number,
            created_at: Utc::now(),
        }
    }

    pub fn verse_key(&self) -> String {
        format!("{}:{}", self.chapter_id, self.verse_number)
    }
}

/// Where a user stopped reading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastReadPosition {
    pub user_id: String,
    pub chapter_id: u16,
    pub verse_number: u16,
    pub updated_at: DateTime<Utc>,
}

impl LastReadPosition {
    pub fn new(user_id: impl Into<String>, chapter_id: u16, verse_number: u16) -> Self {
        Self {
            user_id: user_id.into(),
            chapter_id,
            verse_number,
            updated_at: Utc::now(),
        }
    }
}

/// Pagination resume point for one (chapter, translation) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageCursor {
    pub chapter_id: u16,
    pub translation_id: String,
    /// Token for the next page, `None` once the server reported the end
    pub next_cursor: Option<String>,
    /// Highest verse number merged so far
    pub highest_verse: u16,
}

/// Cached state of one (chapter, translation) verse set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseSetState {
    /// Verses currently cached for the pair
    pub cached_verses: u16,
    /// Verse count of the chapter
    pub chapter_verse_count: u16,
    pub complete: bool,
    pub fetched_at: DateTime<Utc>,
    pub cursor: PageCursor,
}
