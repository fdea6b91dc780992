//! Scriptable in-process content source for tests

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ContentSource, NetworkError, UserStateSink};
use crate::models::{Bookmark, LastReadPosition};

/// Build a chapters payload from `(id, verse_count)` pairs
pub fn chapters_json(chapters: &[(u16, u16)]) -> Value {
    let items: Vec<Value> = chapters
        .iter()
        .map(|&(id, verses)| {
            json!({
                "id": id,
                "name_simple": format!("Chapter {}", id),
                "name_arabic": format!("سورة {}", id),
                "verses_count": verses,
                "revelation_place": "makkah"
            })
        })
        .collect();
    json!({ "chapters": items })
}

/// Build a verses payload covering `range`
pub fn verses_json(
    chapter_id: u16,
    range: RangeInclusive<u16>,
    next_cursor: Option<&str>,
) -> Value {
    let items: Vec<Value> = range
        .map(|n| {
            let rendering = format!("rendering {}:{}", chapter_id, n);
            json!({
                "verse_number": n,
                "verse_key": format!("{}:{}", chapter_id, n),
                "text_uthmani": format!("text {}:{}", chapter_id, n),
                "juz_number": 1,
                "hizb_number": 1,
                "page_number": 1,
                "translations": [{"resource_id": "en", "text": rendering}]
            })
        })
        .collect();
    json!({ "verses": items, "next_cursor": next_cursor })
}

/// Build a translations payload from ids
pub fn translations_json(ids: &[&str]) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "language_name": "english",
                "name": format!("Translation {}", id),
                "author_name": "Author"
            })
        })
        .collect();
    json!({ "translations": items })
}

type PageKey = (u16, String, Option<String>);

/// Mock content source and user-state sink with call counters
#[derive(Default)]
pub struct MockContentSource {
    chapters: Mutex<Option<Value>>,
    translations: Mutex<Option<Value>>,
    pages: Mutex<HashMap<PageKey, Value>>,
    offline: AtomicBool,
    sink_failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    put_delay: Mutex<Option<Duration>>,
    chapter_calls: AtomicUsize,
    verse_calls: AtomicUsize,
    translation_calls: AtomicUsize,
    pushed: Mutex<Vec<String>>,
}

impl MockContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_chapters(&self, body: Value) {
        *self.chapters.lock().unwrap() = Some(body);
    }

    pub fn set_translations(&self, body: Value) {
        *self.translations.lock().unwrap() = Some(body);
    }

    /// Register the response for a verses request
    pub fn set_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
        body: Value,
    ) {
        self.pages.lock().unwrap().insert(
            (chapter_id, translation_id.to_string(), cursor.map(String::from)),
            body,
        );
    }

    /// Make every fetch fail as unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every user-state push fail
    pub fn set_sink_failing(&self, failing: bool) {
        self.sink_failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every fetch before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Delay bookmark puts before they land, leaving deletes immediate
    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn chapter_calls(&self) -> usize {
        self.chapter_calls.load(Ordering::SeqCst)
    }

    pub fn verse_calls(&self) -> usize {
        self.verse_calls.load(Ordering::SeqCst)
    }

    pub fn translation_calls(&self) -> usize {
        self.translation_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.chapter_calls() + self.verse_calls() + self.translation_calls()
    }

    /// User-state pushes that succeeded, as "op target" strings
    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }

    async fn respond(&self, body: Option<Value>) -> Result<Value, NetworkError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable("mock offline".to_string()));
        }
        body.ok_or(NetworkError::HttpStatus(404))
    }

    fn record(&self, entry: String) -> Result<(), NetworkError> {
        if self.sink_failing.load(Ordering::SeqCst) {
            return Err(NetworkError::HttpStatus(503));
        }
        self.pushed.lock().unwrap().push(entry);
        Ok(())
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    async fn fetch_chapters(&self) -> Result<Value, NetworkError> {
        self.chapter_calls.fetch_add(1, Ordering::SeqCst);
        let body = self.chapters.lock().unwrap().clone();
        self.respond(body).await
    }

    async fn fetch_verses_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Value, NetworkError> {
        self.verse_calls.fetch_add(1, Ordering::SeqCst);
        let key = (chapter_id, translation_id.to_string(), cursor.map(String::from));
        let body = self.pages.lock().unwrap().get(&key).cloned();
        self.respond(body).await
    }

    async fn fetch_translations(&self) -> Result<Value, NetworkError> {
        self.translation_calls.fetch_add(1, Ordering::SeqCst);
        let body = self.translations.lock().unwrap().clone();
        self.respond(body).await
    }
}

#[async_trait]
impl UserStateSink for MockContentSource {
    async fn push_bookmark(&self, bookmark: &Bookmark) -> Result<(), NetworkError> {
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("put {}", bookmark.verse_key()))
    }

    async fn delete_bookmark(
        &self,
        _user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> Result<(), NetworkError> {
        self.record(format!("delete {}:{}", chapter_id, verse_number))
    }

    async fn push_last_read(&self, position: &LastReadPosition) -> Result<(), NetworkError> {
        self.record(format!(
            "last-read {}:{}",
            position.chapter_id, position.verse_number
        ))
    }
}
