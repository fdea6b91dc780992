//! Tilawa CLI
//!
//! Command-line interface for Tilawa - offline-first scripture reading.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tilawa_core::{Config, ConnectivitySignal, Repository};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tilawa")]
#[command(about = "Tilawa - Offline-first scripture reader")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Serve everything from the local cache
    #[arg(long, global = true)]
    offline: bool,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to an alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all chapters
    Chapters,
    /// Show verses of a chapter
    Verses {
        /// Chapter number (1-114)
        chapter: u16,
        /// Translation ID (defaults to default_translation)
        #[arg(short, long)]
        translation: Option<String>,
        /// Page token printed by a previous call
        #[arg(long, conflicts_with = "all")]
        cursor: Option<String>,
        /// Follow pages to the end of the chapter
        #[arg(short, long)]
        all: bool,
    },
    /// List available translations
    Translations,
    /// Cache every verse of a chapter for offline reading
    Download {
        /// Chapter number (1-114)
        chapter: u16,
        /// Translation ID (defaults to default_translation)
        #[arg(short, long)]
        translation: Option<String>,
    },
    /// Re-fetch a whole chapter and replace the cached copy
    Refresh {
        /// Chapter number (1-114)
        chapter: u16,
        /// Translation ID (defaults to default_translation)
        #[arg(short, long)]
        translation: Option<String>,
    },
    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },
    /// Show or set the last-read position
    LastRead {
        #[command(subcommand)]
        command: Option<LastReadCommands>,
    },
    /// Show cache and connection status
    Status,
    /// Manage the content cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum BookmarkCommands {
    /// Bookmark a verse
    Add {
        /// Verse key (e.g. 2:255)
        verse: String,
    },
    /// Remove a bookmark
    #[command(alias = "rm")]
    Remove {
        /// Verse key (e.g. 2:255)
        verse: String,
    },
    /// List bookmarks
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
enum LastReadCommands {
    /// Show the last-read position
    Show,
    /// Record where you stopped reading
    Set {
        /// Verse key (e.g. 18:10)
        verse: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cached content counts
    Stats,
    /// Drop cached chapters, verses and translations (keeps bookmarks)
    Clear,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, page_size, default_translation, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    init_logging(cli.verbose);

    // Config commands work without opening the cache
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    let mut repo = Repository::open(&config).context("Failed to open content cache")?;
    if cli.offline {
        repo = repo.with_connectivity(Arc::new(ConnectivitySignal::new(false)));
    }

    match cli.command {
        Commands::Chapters => commands::chapters::list(&repo, &output).await,
        Commands::Verses {
            chapter,
            translation,
            cursor,
            all,
        } => {
            let translation = translation.unwrap_or_else(|| config.default_translation.clone());
            if all {
                commands::verses::show_all(&repo, chapter, &translation, &output).await
            } else {
                commands::verses::show(&repo, chapter, &translation, cursor, &output).await
            }
        }
        Commands::Translations => commands::chapters::translations(&repo, &output).await,
        Commands::Download {
            chapter,
            translation,
        } => {
            let translation = translation.unwrap_or_else(|| config.default_translation.clone());
            commands::verses::download(&repo, chapter, &translation, &output).await
        }
        Commands::Refresh {
            chapter,
            translation,
        } => {
            let translation = translation.unwrap_or_else(|| config.default_translation.clone());
            commands::verses::refresh(&repo, chapter, &translation, &output).await
        }
        Commands::Bookmark { command } => {
            handle_bookmark_command(command, &repo, &config, &output).await
        }
        Commands::LastRead { command } => {
            handle_last_read_command(command, &repo, &config, &output).await
        }
        Commands::Status => commands::status::show(&repo, &config, &output).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => commands::cache::stats(&repo, &output).await,
            CacheCommands::Clear => commands::cache::clear(&repo, &output).await,
        },
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

async fn handle_bookmark_command(
    command: BookmarkCommands,
    repo: &Repository,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        BookmarkCommands::Add { verse } => {
            commands::bookmark::add(repo, config, &verse, output).await
        }
        BookmarkCommands::Remove { verse } => {
            commands::bookmark::remove(repo, config, &verse, output).await
        }
        BookmarkCommands::List => commands::bookmark::list(repo, config, output).await,
    }
}

async fn handle_last_read_command(
    command: Option<LastReadCommands>,
    repo: &Repository,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(LastReadCommands::Show) | None => {
            commands::bookmark::show_last_read(repo, config, output).await
        }
        Some(LastReadCommands::Set { verse }) => {
            commands::bookmark::set_last_read(repo, config, &verse, output).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging to stderr
///
/// RUST_LOG wins when set; otherwise the level follows --verbose.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("tilawa_core={},tilawa_cli={}", level, level))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
