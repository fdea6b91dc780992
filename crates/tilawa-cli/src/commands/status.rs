//! Status command handler

use anyhow::Result;

use tilawa_core::{Config, Repository};

use crate::output::{local_time, Output, OutputFormat};

/// Show connection and cache status
pub async fn show(repo: &Repository, config: &Config, output: &Output) -> Result<()> {
    let stats = repo.cache_stats().await?;
    let last_read = repo.get_last_read(&config.user_id).await?;
    let online = repo.is_online();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "online": online,
                    "api_url": config.api_url,
                    "sync_user_state": config.sync_user_state,
                    "user_id": config.user_id,
                    "cache_path": config.cache_db_path(),
                    "cache": stats,
                    "last_read": last_read
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if online { "online" } else { "offline" });
        }
        OutputFormat::Human => {
            println!("Tilawa Status");
            println!("=============");
            println!();
            println!("Server:");
            println!(
                "  URL:       {}",
                config.api_url.as_deref().unwrap_or("(not set)")
            );
            println!("  Mode:      {}", if online { "online" } else { "offline" });
            println!(
                "  User sync: {}",
                if config.sync_user_state {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!();
            println!("Cache:");
            println!("  Location:  {}", config.cache_db_path().display());
            println!("  Chapters:  {}", stats.chapters);
            println!(
                "  Offline:   {} of {} verse set(s) complete",
                stats.complete_verse_sets, stats.verse_sets
            );
            println!();
            println!("Reading ({}):", config.user_id);
            println!("  Bookmarks: {}", stats.bookmarks);
            match last_read {
                Some(p) => println!(
                    "  Last read: {}:{} ({})",
                    p.chapter_id,
                    p.verse_number,
                    local_time(&p.updated_at)
                ),
                None => println!("  Last read: (none)"),
            }
        }
    }

    Ok(())
}
