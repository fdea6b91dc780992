//! Catalog command handlers

use anyhow::Result;

use tilawa_core::Repository;

use crate::output::Output;

/// List all chapters
pub async fn list(repo: &Repository, output: &Output) -> Result<()> {
    let chapters = repo.get_chapters().await?;
    output.print_chapters(&chapters);
    Ok(())
}

/// List available translations
pub async fn translations(repo: &Repository, output: &Output) -> Result<()> {
    let translations = repo.get_translations().await?;
    output.print_translations(&translations);
    Ok(())
}
