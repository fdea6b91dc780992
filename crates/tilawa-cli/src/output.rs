//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)
//!
//! Results served from the local cache are marked as such in human output;
//! JSON output carries the `source` and `fetched_at` fields instead.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use tilawa_core::{Bookmark, CacheEntry, Chapter, LastReadPosition, Translation, VersesPage};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
    }

    /// Print the chapter catalog
    pub fn print_chapters(&self, entry: &CacheEntry<Vec<Chapter>>) {
        match self.format {
            OutputFormat::Human => {
                for chapter in &entry.data {
                    println!(
                        "{:>3}  {:<24} {:>3} verses  {:<8} {}",
                        chapter.id,
                        truncate(&chapter.name, 24),
                        chapter.verse_count,
                        chapter.revelation_place,
                        chapter.native_name
                    );
                }
                println!("\n{} chapter(s)", entry.data.len());
                self.cache_note(entry);
            }
            OutputFormat::Json => self.json(entry),
            OutputFormat::Quiet => {
                for chapter in &entry.data {
                    println!("{}", chapter.id);
                }
            }
        }
    }

    /// Print a page of verses with the rendering for `translation_id`
    pub fn print_verses(&self, entry: &CacheEntry<VersesPage>, translation_id: &str) {
        match self.format {
            OutputFormat::Human => {
                if entry.data.verses.is_empty() {
                    println!("No verses on this page.");
                }
                for verse in &entry.data.verses {
                    println!("[{}] {}", verse.key(), verse.text);
                    if let Some(rendering) = verse.rendering(translation_id) {
                        println!("      {}", rendering);
                    }
                    println!();
                }
                if let Some(ref cursor) = entry.data.next_cursor {
                    println!("More verses: --cursor {}", cursor);
                }
                self.cache_note(entry);
            }
            OutputFormat::Json => self.json(entry),
            OutputFormat::Quiet => {
                for verse in &entry.data.verses {
                    println!("{}", verse.key());
                }
            }
        }
    }

    /// Print the translation catalog
    pub fn print_translations(&self, entry: &CacheEntry<Vec<Translation>>) {
        match self.format {
            OutputFormat::Human => {
                if entry.data.is_empty() {
                    println!("No translations found.");
                }
                for t in &entry.data {
                    println!(
                        "{:<10} {:<12} {} ({})",
                        t.id,
                        truncate(&t.language, 12),
                        t.name,
                        t.author
                    );
                }
                self.cache_note(entry);
            }
            OutputFormat::Json => self.json(entry),
            OutputFormat::Quiet => {
                for t in &entry.data {
                    println!("{}", t.id);
                }
            }
        }
    }

    /// Print a list of bookmarks
    pub fn print_bookmarks(&self, bookmarks: &[Bookmark]) {
        match self.format {
            OutputFormat::Human => {
                if bookmarks.is_empty() {
                    println!("No bookmarks.");
                    return;
                }
                for b in bookmarks {
                    println!("{:<8} added {}", b.verse_key(), local_time(&b.created_at));
                }
                println!("\n{} bookmark(s)", bookmarks.len());
            }
            OutputFormat::Json => self.json(bookmarks),
            OutputFormat::Quiet => {
                for b in bookmarks {
                    println!("{}", b.verse_key());
                }
            }
        }
    }

    /// Print a last-read position
    pub fn print_last_read(&self, position: Option<&LastReadPosition>) {
        match (self.format, position) {
            (OutputFormat::Human, Some(p)) => {
                println!(
                    "Last read: {}:{} ({})",
                    p.chapter_id,
                    p.verse_number,
                    local_time(&p.updated_at)
                );
            }
            (OutputFormat::Human, None) => println!("No last-read position recorded."),
            (OutputFormat::Json, _) => self.json(&position),
            (OutputFormat::Quiet, Some(p)) => println!("{}:{}", p.chapter_id, p.verse_number),
            (OutputFormat::Quiet, None) => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warn(&self, msg: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", msg);
        }
    }

    fn cache_note<T>(&self, entry: &CacheEntry<T>) {
        if entry.is_from_cache() {
            println!("(offline: cached {})", local_time(&entry.fetched_at));
        }
    }
}

/// Format a UTC timestamp in local time
pub fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Al-Mumtahanah and more", 10), "Al-Mumt...");
        // Multi-byte names are cut on character boundaries
        assert_eq!(truncate("ٱلْفَاتِحَةِ", 4), "ٱ...");
    }
}
