//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use tilawa_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => output.json(&config),
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!(
                "  api_url:              {}",
                config.api_url.as_deref().unwrap_or("(not set)")
            );
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!("  page_size:            {}", config.page_size);
            println!("  default_translation:  {}", config.default_translation);
            println!("  user_id:              {}", config.user_id);
            println!("  sync_user_state:      {}", config.sync_user_state);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set(&key, &value).with_context(|| {
        "Valid keys: data_dir, api_url, request_timeout_secs, page_size, \
         default_translation, user_id, sync_user_state"
    })?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
