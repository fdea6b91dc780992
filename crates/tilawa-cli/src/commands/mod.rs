//! Command handlers

pub mod bookmark;
pub mod cache;
pub mod chapters;
pub mod config;
pub mod status;
pub mod verses;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use tilawa_core::RepositoryEvent;

use crate::output::Output;

/// Parse a `chapter:verse` key such as `2:255`
pub fn parse_verse_key(key: &str) -> Result<(u16, u16)> {
    let Some((chapter, verse)) = key.trim().split_once(':') else {
        bail!("Expected a verse key like 2:255, got: {}", key);
    };

    let chapter = chapter
        .parse()
        .with_context(|| format!("Invalid chapter number: {}", chapter))?;
    let verse = verse
        .parse()
        .with_context(|| format!("Invalid verse number: {}", verse))?;
    Ok((chapter, verse))
}

/// Wait for a background push to finish before the process exits
///
/// The local change is already committed; this only reports whether the
/// server got it.
pub async fn await_propagation(
    mut events: broadcast::Receiver<RepositoryEvent>,
    deadline: Duration,
    output: &Output,
) {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(RepositoryEvent::Propagated { mutation }) => {
                    debug!(%mutation, "Synced");
                    return;
                }
                Ok(RepositoryEvent::PropagationFailed(failure)) => {
                    output.warn(&format!("Saved locally, not synced: {}", failure.source));
                    return;
                }
                Ok(RepositoryEvent::FellBack { .. }) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            }
        }
    };

    if tokio::time::timeout(deadline, wait).await.is_err() {
        output.warn("Saved locally, sync did not finish in time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verse_key() {
        assert_eq!(parse_verse_key("2:255").unwrap(), (2, 255));
        assert_eq!(parse_verse_key(" 1:7 ").unwrap(), (1, 7));
    }

    #[test]
    fn test_parse_verse_key_rejects_garbage() {
        assert!(parse_verse_key("2").is_err());
        assert!(parse_verse_key("a:1").is_err());
        assert!(parse_verse_key("1:").is_err());
        assert!(parse_verse_key("1:-3").is_err());
    }
}
