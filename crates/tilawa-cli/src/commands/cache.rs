//! Cache command handlers

use anyhow::Result;

use tilawa_core::Repository;

use crate::output::{Output, OutputFormat};

/// Show cached content counts
pub async fn stats(repo: &Repository, output: &Output) -> Result<()> {
    let stats = repo.cache_stats().await?;

    match output.format {
        OutputFormat::Json => output.json(&stats),
        OutputFormat::Quiet => println!("{}", stats.verses),
        OutputFormat::Human => {
            println!("Cached content:");
            println!("  Chapters:      {}", stats.chapters);
            println!("  Translations:  {}", stats.translations);
            println!(
                "  Verse sets:    {} ({} complete)",
                stats.verse_sets, stats.complete_verse_sets
            );
            println!("  Verses:        {}", stats.verses);
            println!();
            println!("User state:");
            println!("  Bookmarks:     {}", stats.bookmarks);
            println!("  Last read:     {}", stats.last_read);
        }
    }

    Ok(())
}

/// Drop cached reference content
pub async fn clear(repo: &Repository, output: &Output) -> Result<()> {
    repo.clear_cache().await?;
    output.success("Cleared cached chapters, verses and translations");
    Ok(())
}
