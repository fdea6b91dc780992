//! Bookmark and last-read command handlers

use std::time::Duration;

use anyhow::Result;

use tilawa_core::{Config, LastReadPosition, Repository};

use super::{await_propagation, parse_verse_key};
use crate::output::{Output, OutputFormat};

/// Extra time allowed for a push on top of the request deadline
const SYNC_GRACE: Duration = Duration::from_secs(1);

/// Bookmark a verse
pub async fn add(repo: &Repository, config: &Config, verse: &str, output: &Output) -> Result<()> {
    let (chapter, verse) = parse_verse_key(verse)?;

    let existing = repo.list_bookmarks(&config.user_id).await?;
    let already = existing
        .iter()
        .any(|b| b.chapter_id == chapter && b.verse_number == verse);

    let events = repo.subscribe_events();
    let bookmark = repo.add_bookmark(&config.user_id, chapter, verse).await?;

    if !already && repo.propagates_mutations() {
        await_propagation(events, config.request_timeout() + SYNC_GRACE, output).await;
    }

    match output.format {
        OutputFormat::Json => output.json(&bookmark),
        OutputFormat::Quiet => println!("{}", bookmark.verse_key()),
        OutputFormat::Human => {
            if already {
                output.message(&format!("Already bookmarked: {}", bookmark.verse_key()));
            } else {
                output.success(&format!("Bookmarked {}", bookmark.verse_key()));
            }
        }
    }

    Ok(())
}

/// Remove a bookmark
pub async fn remove(
    repo: &Repository,
    config: &Config,
    verse: &str,
    output: &Output,
) -> Result<()> {
    let (chapter, verse) = parse_verse_key(verse)?;

    let events = repo.subscribe_events();
    let removed = repo
        .remove_bookmark(&config.user_id, chapter, verse)
        .await?;

    if removed && repo.propagates_mutations() {
        await_propagation(events, config.request_timeout() + SYNC_GRACE, output).await;
    }

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "verse_key": format!("{}:{}", chapter, verse),
                    "removed": removed
                })
            );
        }
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            if removed {
                output.success(&format!("Removed bookmark {}:{}", chapter, verse));
            } else {
                output.message(&format!("No bookmark on {}:{}", chapter, verse));
            }
        }
    }

    Ok(())
}

/// List bookmarks of the configured user
pub async fn list(repo: &Repository, config: &Config, output: &Output) -> Result<()> {
    let bookmarks = repo.list_bookmarks(&config.user_id).await?;
    output.print_bookmarks(&bookmarks);
    Ok(())
}

/// Show the last-read position
pub async fn show_last_read(repo: &Repository, config: &Config, output: &Output) -> Result<()> {
    let position = repo.get_last_read(&config.user_id).await?;
    output.print_last_read(position.as_ref());
    Ok(())
}

/// Record the last-read position
pub async fn set_last_read(
    repo: &Repository,
    config: &Config,
    verse: &str,
    output: &Output,
) -> Result<()> {
    let (chapter, verse) = parse_verse_key(verse)?;

    let events = repo.subscribe_events();
    let position = LastReadPosition::new(&config.user_id, chapter, verse);
    let applied = repo.save_last_read(position).await?;

    if applied && repo.propagates_mutations() {
        await_propagation(events, config.request_timeout() + SYNC_GRACE, output).await;
    }

    if applied {
        output.success(&format!("Last read set to {}:{}", chapter, verse));
    } else {
        output.warn("A newer last-read position is already stored");
    }

    Ok(())
}
