//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tilawa/config.toml)
//! 3. Environment variables (TILAWA_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "TILAWA";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory for the content cache
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Content server base URL; without one the repository works from cache only
    #[serde(default)]
    pub api_url: Option<String>,

    /// Deadline for a single request to the content server
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Verses requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Translation used when none is given
    #[serde(default = "default_translation")]
    pub default_translation: String,

    /// Owner of bookmarks and last-read position on this device
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Push bookmark and last-read changes to the content server
    #[serde(default)]
    pub sync_user_state: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
            default_translation: default_translation(),
            user_id: default_user_id(),
            sync_user_state: false,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TILAWA_DATA_DIR, TILAWA_API_URL, ...)
    /// 2. Config file (~/.config/tilawa/config.toml or TILAWA_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a path given on the command line, or the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok();

        if let Some(val) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears the server
        if let Some(val) = var("API_URL") {
            self.api_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Some(secs) = var("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|&secs: &u64| secs > 0)
        {
            self.request_timeout_secs = secs;
        }

        if let Some(size) = var("PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.page_size = size;
        }

        if let Some(val) = var("DEFAULT_TRANSLATION").filter(|v| !v.is_empty()) {
            self.default_translation = val;
        }

        if let Some(val) = var("USER_ID").filter(|v| !v.is_empty()) {
            self.user_id = val;
        }

        if let Some(val) = var("SYNC_USER_STATE") {
            self.sync_user_state = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Set a single value by its config file key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "api_url" => {
                self.api_url = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "request_timeout_secs" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout: {}", value))?;
                if secs == 0 {
                    bail!("request_timeout_secs must be at least 1");
                }
                self.request_timeout_secs = secs;
            }
            "page_size" => {
                let size: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid page size: {}", value))?;
                if size == 0 {
                    bail!("page_size must be at least 1");
                }
                self.page_size = size;
            }
            "default_translation" => self.default_translation = value.to_string(),
            "user_id" => {
                if value.trim().is_empty() {
                    bail!("user_id cannot be empty");
                }
                self.user_id = value.to_string();
            }
            "sync_user_state" => {
                self.sync_user_state = value
                    .parse()
                    .with_context(|| format!("Expected true or false, got: {}", value))?
            }
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TILAWA_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilawa")
            .join("config.toml")
    }

    /// Get the path to the SQLite cache
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    /// Request deadline as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilawa")
}

fn default_request_timeout_secs() -> u64 {
    8
}

fn default_page_size() -> u32 {
    50
}

fn default_translation() -> String {
    "en".to_string()
}

fn default_user_id() -> String {
    "local".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TILAWA_DATA_DIR",
        "TILAWA_API_URL",
        "TILAWA_REQUEST_TIMEOUT_SECS",
        "TILAWA_PAGE_SIZE",
        "TILAWA_DEFAULT_TRANSLATION",
        "TILAWA_USER_ID",
        "TILAWA_SYNC_USER_STATE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_url.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(8));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.default_translation, "en");
        assert_eq!(config.user_id, "local");
        assert!(!config.sync_user_state);
        assert!(config.data_dir.ends_with("tilawa"));
    }

    #[test]
    fn test_cache_path() {
        let config = Config::default();
        assert!(config.cache_db_path().ends_with("cache.db"));
        assert!(config.cache_db_path().starts_with(&config.data_dir));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TILAWA_DATA_DIR", "/tmp/tilawa-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/tilawa-test"));
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TILAWA_API_URL", "https://api.example.com");
        config.apply_env_overrides();
        assert_eq!(config.api_url.as_deref(), Some("https://api.example.com"));

        // Empty string clears it
        env::set_var("TILAWA_API_URL", "");
        config.apply_env_overrides();
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_env_override_numbers_ignore_garbage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TILAWA_REQUEST_TIMEOUT_SECS", "3");
        env::set_var("TILAWA_PAGE_SIZE", "many");
        config.apply_env_overrides();

        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.page_size, 50);

        // A zero deadline would fail every request
        env::set_var("TILAWA_REQUEST_TIMEOUT_SECS", "0");
        config.apply_env_overrides();
        assert_eq!(config.request_timeout_secs, 3);
    }

    #[test]
    fn test_env_override_sync_user_state() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TILAWA_SYNC_USER_STATE", "true");
        config.apply_env_overrides();
        assert!(config.sync_user_state);

        env::set_var("TILAWA_SYNC_USER_STATE", "0");
        config.apply_env_overrides();
        assert!(!config.sync_user_state);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_url = "https://api.example.com/v4"
            page_size = 20
            user_id = "amina"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_url.as_deref(), Some("https://api.example.com/v4"));
        assert_eq!(config.page_size, 20);
        assert_eq!(config.user_id, "amina");
        // Unset keys keep their defaults
        assert_eq!(config.request_timeout_secs, 8);
        assert_eq!(config.default_translation, "en");
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        env::set_var("TILAWA_DATA_DIR", temp_dir.path().join("data"));

        let config = Config::load_from_path(&temp_dir.path().join("missing.toml")).unwrap();
        assert!(config.api_url.is_none());
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.set("api_url", "https://api.example.com").unwrap();
        config.set("sync_user_state", "true").unwrap();
        config.save_to_path(&path).unwrap();

        let reloaded = Config::load_from_path(&path).unwrap();
        assert_eq!(reloaded, config);

        let overridden = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(overridden.api_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("page_size", "0").is_err());
        assert!(config.set("page_size", "ten").is_err());
        assert!(config.set("request_timeout_secs", "0").is_err());
        assert_eq!(config.request_timeout_secs, 8);
        assert!(config.set("user_id", " ").is_err());
        assert!(config.set("colour", "blue").is_err());

        config.set("api_url", "").unwrap();
        assert!(config.api_url.is_none());
    }
}
