//! Payload validation
//!
//! Every remote response passes through here before it can reach the cache.
//! Validation is pure: the raw JSON is only read, and the typed result is
//! built from owned wire structs.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaMismatch;
use crate::models::{
    is_valid_chapter_id, Chapter, RevelationPlace, Translation, TranslationRendering, Verse,
    VerseMetadata, VersesPage, MAX_HIZB, MAX_JUZ, MAX_PAGE,
};

/// The payload shape a response is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Chapters,
    /// A page of verses for one chapter; `verse_count` bounds verse numbers when known
    VersesPage {
        chapter_id: u16,
        verse_count: Option<u16>,
    },
    Translations,
}

impl PayloadKind {
    pub fn name(&self) -> &'static str {
        match self {
            PayloadKind::Chapters => "chapters",
            PayloadKind::VersesPage { .. } => "verses",
            PayloadKind::Translations => "translations",
        }
    }
}

/// A validated payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Chapters(Vec<Chapter>),
    VersesPage(VersesPage),
    Translations(Vec<Translation>),
}

// ==================== Wire format ====================

#[derive(Deserialize)]
struct ChaptersWire {
    chapters: Vec<ChapterWire>,
}

#[derive(Deserialize)]
struct ChapterWire {
    id: u16,
    name_simple: String,
    name_arabic: String,
    verses_count: u16,
    revelation_place: String,
}

#[derive(Deserialize)]
struct VersesWire {
    verses: Vec<VerseWire>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct VerseWire {
    verse_number: u16,
    #[serde(default)]
    verse_key: Option<String>,
    text_uthmani: String,
    juz_number: u8,
    hizb_number: u8,
    page_number: u16,
    #[serde(default)]
    translations: Vec<RenderingWire>,
}

#[derive(Deserialize)]
struct RenderingWire {
    resource_id: String,
    text: String,
}

#[derive(Deserialize)]
struct TranslationsWire {
    translations: Vec<TranslationWire>,
}

#[derive(Deserialize)]
struct TranslationWire {
    id: String,
    language_name: String,
    name: String,
    author_name: String,
}

// ==================== Validation ====================

/// Validate a raw response against the expected payload kind
pub fn validate(kind: PayloadKind, raw: &Value) -> Result<Payload, SchemaMismatch> {
    match kind {
        PayloadKind::Chapters => validate_chapters(raw).map(Payload::Chapters),
        PayloadKind::VersesPage {
            chapter_id,
            verse_count,
        } => validate_verses_page(raw, chapter_id, verse_count).map(Payload::VersesPage),
        PayloadKind::Translations => validate_translations(raw).map(Payload::Translations),
    }
}

fn decode<'a, T: Deserialize<'a>>(kind: &'static str, raw: &'a Value) -> Result<T, SchemaMismatch> {
    T::deserialize(raw).map_err(|e| SchemaMismatch::new(kind, e.to_string()))
}

fn require_text(
    kind: &'static str,
    field: &str,
    value: &str,
    at: impl std::fmt::Display,
) -> Result<(), SchemaMismatch> {
    if value.trim().is_empty() {
        return Err(SchemaMismatch::new(kind, format!("empty {} at {}", field, at)));
    }
    Ok(())
}

/// Validate the chapter catalog; chapters are returned ordered by id
pub fn validate_chapters(raw: &Value) -> Result<Vec<Chapter>, SchemaMismatch> {
    const KIND: &str = "chapters";
    let wire: ChaptersWire = decode(KIND, raw)?;

    if wire.chapters.is_empty() {
        return Err(SchemaMismatch::new(KIND, "catalog is empty"));
    }

    let mut seen = HashSet::new();
    let mut chapters = Vec::with_capacity(wire.chapters.len());

    for c in wire.chapters {
        if !is_valid_chapter_id(c.id) {
            return Err(SchemaMismatch::new(KIND, format!("chapter id {} out of range", c.id)));
        }
        if !seen.insert(c.id) {
            return Err(SchemaMismatch::new(KIND, format!("duplicate chapter id {}", c.id)));
        }
        if c.verses_count == 0 {
            return Err(SchemaMismatch::new(KIND, format!("chapter {} has no verses", c.id)));
        }
        require_text(KIND, "name", &c.name_simple, format_args!("chapter {}", c.id))?;
        require_text(KIND, "native name", &c.name_arabic, format_args!("chapter {}", c.id))?;

        let revelation_place = RevelationPlace::parse(&c.revelation_place).ok_or_else(|| {
            SchemaMismatch::new(
                KIND,
                format!("unknown revelation place '{}' for chapter {}", c.revelation_place, c.id),
            )
        })?;

        chapters.push(Chapter {
            id: c.id,
            name: c.name_simple,
            native_name: c.name_arabic,
            verse_count: c.verses_count,
            revelation_place,
        });
    }

    chapters.sort_by_key(|c| c.id);
    Ok(chapters)
}

/// Validate one page of verses for `chapter_id`
pub fn validate_verses_page(
    raw: &Value,
    chapter_id: u16,
    verse_count: Option<u16>,
) -> Result<VersesPage, SchemaMismatch> {
    const KIND: &str = "verses";
    let wire: VersesWire = decode(KIND, raw)?;

    let mut seen = HashSet::new();
    let mut verses = Vec::with_capacity(wire.verses.len());

    for v in wire.verses {
        let n = v.verse_number;
        if n == 0 {
            return Err(SchemaMismatch::new(KIND, "verse number 0"));
        }
        if let Some(count) = verse_count {
            if n > count {
                return Err(SchemaMismatch::new(
                    KIND,
                    format!("verse {} beyond chapter {} ({} verses)", n, chapter_id, count),
                ));
            }
        }
        if !seen.insert(n) {
            return Err(SchemaMismatch::new(KIND, format!("duplicate verse {}", n)));
        }
        if let Some(key) = &v.verse_key {
            let expected = format!("{}:{}", chapter_id, n);
            if *key != expected {
                return Err(SchemaMismatch::new(
                    KIND,
                    format!("verse key '{}' does not match {}", key, expected),
                ));
            }
        }
        require_text(KIND, "text", &v.text_uthmani, format_args!("verse {}", n))?;

        if !(1..=MAX_JUZ).contains(&v.juz_number)
            || !(1..=MAX_HIZB).contains(&v.hizb_number)
            || !(1..=MAX_PAGE).contains(&v.page_number)
        {
            return Err(SchemaMismatch::new(
                KIND,
                format!("structural metadata out of range at verse {}", n),
            ));
        }

        let mut translations = Vec::with_capacity(v.translations.len());
        for r in v.translations {
            require_text(KIND, "translation id", &r.resource_id, format_args!("verse {}", n))?;
            translations.push(TranslationRendering {
                translation_id: r.resource_id,
                text: r.text,
            });
        }

        verses.push(Verse {
            chapter_id,
            verse_number: n,
            text: v.text_uthmani,
            metadata: VerseMetadata {
                juz: v.juz_number,
                hizb: v.hizb_number,
                page: v.page_number,
            },
            translations,
        });
    }

    verses.sort_by_key(|v| v.verse_number);

    let next_cursor = wire.next_cursor.filter(|c| !c.is_empty());
    Ok(VersesPage {
        verses,
        next_cursor,
    })
}

/// Validate the translation catalog; order is preserved
pub fn validate_translations(raw: &Value) -> Result<Vec<Translation>, SchemaMismatch> {
    const KIND: &str = "translations";
    let wire: TranslationsWire = decode(KIND, raw)?;

    let mut seen = HashSet::new();
    let mut translations = Vec::with_capacity(wire.translations.len());

    for (i, t) in wire.translations.into_iter().enumerate() {
        require_text(KIND, "id", &t.id, format_args!("entry {}", i))?;
        require_text(KIND, "name", &t.name, format_args!("translation '{}'", t.id))?;
        if !seen.insert(t.id.clone()) {
            return Err(SchemaMismatch::new(KIND, format!("duplicate translation id '{}'", t.id)));
        }

        translations.push(Translation {
            id: t.id,
            language: t.language_name,
            name: t.name,
            author: t.author_name,
        });
    }

    Ok(translations)
}
