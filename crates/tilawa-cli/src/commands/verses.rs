//! Verse command handlers

use anyhow::Result;

use tilawa_core::{CacheEntry, Repository, Source, VersesPage};

use crate::output::{Output, OutputFormat};

/// Show one page of a chapter
pub async fn show(
    repo: &Repository,
    chapter: u16,
    translation: &str,
    cursor: Option<String>,
    output: &Output,
) -> Result<()> {
    let page = repo
        .get_verses_page(chapter, translation, cursor.as_deref())
        .await?;
    output.print_verses(&page, translation);
    Ok(())
}

/// Show a whole chapter by following page cursors
pub async fn show_all(
    repo: &Repository,
    chapter: u16,
    translation: &str,
    output: &Output,
) -> Result<()> {
    let mut entry = repo.get_verses_page(chapter, translation, None).await?;
    let mut cursor = entry.data.next_cursor.take();

    while let Some(token) = cursor {
        let next = repo
            .get_verses_page(chapter, translation, Some(&token))
            .await?;
        let before = entry.data.verses.len();
        merge_page(&mut entry, next);

        cursor = entry.data.next_cursor.take();
        // A page that adds nothing means the cursor chain went stale
        if entry.data.verses.len() == before || cursor.as_deref() == Some(token.as_str()) {
            break;
        }
    }

    output.print_verses(&entry, translation);
    Ok(())
}

/// Fold a following page into an accumulated one, keeping verse order
fn merge_page(acc: &mut CacheEntry<VersesPage>, next: CacheEntry<VersesPage>) {
    let highest = acc.data.highest_verse().unwrap_or(0);
    acc.data.verses.extend(
        next.data
            .verses
            .into_iter()
            .filter(|v| v.verse_number > highest),
    );
    acc.data.next_cursor = next.data.next_cursor;

    // The oldest part decides how fresh the whole result is
    if next.fetched_at < acc.fetched_at {
        acc.fetched_at = next.fetched_at;
    }
    if next.source != acc.source {
        acc.source = Source::Cache;
    }
}

/// Download a chapter for offline reading
pub async fn download(
    repo: &Repository,
    chapter: u16,
    translation: &str,
    output: &Output,
) -> Result<()> {
    let report = repo.download_chapter(chapter, translation).await?;

    match output.format {
        OutputFormat::Json => output.json(&report),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            if report.complete {
                output.success(&format!(
                    "Chapter {} ({}) available offline: {} verses",
                    chapter, translation, report.verse_count
                ));
            } else {
                output.warn(&format!(
                    "Chapter {} ({}) partially downloaded: {}/{} verses. Run again to resume.",
                    chapter, translation, report.cached_verses, report.verse_count
                ));
            }
            if report.pages > 0 {
                println!(
                    "Fetched {} page(s), {} new verse(s)",
                    report.pages, report.inserted
                );
            }
        }
    }

    Ok(())
}

/// Re-fetch a chapter and replace the cached copy
pub async fn refresh(
    repo: &Repository,
    chapter: u16,
    translation: &str,
    output: &Output,
) -> Result<()> {
    let verses = repo.refresh_chapter(chapter, translation).await?;

    match output.format {
        OutputFormat::Json => output.json(&verses),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            if verses.is_from_cache() {
                output.warn(&format!(
                    "Refresh failed, kept {} cached verse(s) of chapter {}",
                    verses.data.len(),
                    chapter
                ));
            } else {
                output.success(&format!(
                    "Refreshed chapter {} ({}): {} verses",
                    chapter,
                    translation,
                    verses.data.len()
                ));
            }
        }
    }

    Ok(())
}
