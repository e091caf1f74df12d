//! Configuration management for the Hextok client.
//!
//! Loads configuration from ${HEXTOK_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New comments/sections from the template are always present while the
/// user's customized values are preserved.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for Hextok configuration and data directories.
    //!
    //! HEXTOK_HOME resolution order:
    //! 1. HEXTOK_HOME environment variable (if set)
    //! 2. ~/.config/hextok (default)
    //! 3. ./.hextok when no home directory can be determined

    use std::env;
    use std::path::PathBuf;

    /// Returns the Hextok home directory.
    pub fn hextok_home() -> PathBuf {
        if let Ok(home) = env::var("HEXTOK_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".hextok"),
            |h| h.join(".config").join("hextok"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        hextok_home().join("config.toml")
    }

    /// Returns the path of the file-backed key-value store.
    pub fn storage_path() -> PathBuf {
        hextok_home().join("storage.json")
    }

    /// Returns the path where the file-backed deep-link source keeps the
    /// last received link.
    pub fn deep_link_path() -> PathBuf {
        hextok_home().join("last_deeplink.json")
    }

    /// Returns the log directory.
    pub fn logs_dir() -> PathBuf {
        hextok_home().join("logs")
    }
}

/// Storage key layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Key holding the bearer session token
    pub session_key: String,
    /// Key holding the last raw deep-link payload JSON
    pub deep_link_key: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            session_key: "hextok_session".to_string(),
            deep_link_key: "hextok_oauth_deeplink".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Hextok API
    pub api_base: String,

    /// Custom URL scheme registered by the app
    pub scheme: String,

    /// OAuth provider for the browser sign-in flow
    pub oauth_provider: String,

    /// Route prefixes that require authentication
    pub protected_routes: Vec<String>,

    /// Background deep-link poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Extra attempts for a failed profile fetch
    pub profile_retries: u32,

    /// HTTP request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,

    /// Log filter used when HEXTOK_LOG is unset
    pub log_level: String,

    /// Also write logs to ${HEXTOK_HOME}/logs
    pub log_to_file: bool,

    /// Storage key layout
    pub storage: StorageKeys,
}

impl Config {
    const DEFAULT_API_BASE: &str = "http://localhost:8080";
    const DEFAULT_SCHEME: &str = "hextok";
    const DEFAULT_OAUTH_PROVIDER: &str = "github";
    const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
    const DEFAULT_PROFILE_RETRIES: u32 = 2;
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Saves only the `api_base` field to the config file.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed, or written.
    pub fn save_api_base(api_base: &str) -> Result<()> {
        Self::save_api_base_to(&paths::config_path(), api_base)
    }

    /// Saves only the `api_base` field to a specific config file path.
    ///
    /// Creates the file from the default template if it doesn't exist.
    /// If the file exists, merges user values into the latest template.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed, or written.
    pub fn save_api_base_to(path: &Path, api_base: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["api_base"] = value(api_base.trim_end_matches('/'));

        Self::write_config(path, &doc.to_string())
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// API base without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    /// Redirect URI the OAuth provider sends the user back to.
    pub fn callback_uri(&self) -> String {
        format!("{}://oauth/callback", self.scheme)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Returns the request timeout, or None when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            scheme: Self::DEFAULT_SCHEME.to_string(),
            oauth_provider: Self::DEFAULT_OAUTH_PROVIDER.to_string(),
            protected_routes: vec!["/profile".to_string(), "/liked".to_string()],
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            profile_retries: Self::DEFAULT_PROFILE_RETRIES,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            log_level: "info".to_string(),
            log_to_file: false,
            storage: StorageKeys::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.api_base, "http://localhost:8080");
        assert_eq!(config.protected_routes, vec!["/profile", "/liked"]);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "api_base = \"https://api.example.test/\"\n[storage]\nsession_key = \"tok\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.api_base(), "https://api.example.test");
        assert_eq!(config.storage.session_key, "tok");
        assert_eq!(config.storage.deep_link_key, "hextok_oauth_deeplink");
        assert_eq!(config.profile_retries, 2);
    }

    #[test]
    fn test_default_template_matches_rust_defaults() {
        let parsed: Config = toml::from_str(default_config_template()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.api_base, defaults.api_base);
        assert_eq!(parsed.scheme, defaults.scheme);
        assert_eq!(parsed.protected_routes, defaults.protected_routes);
        assert_eq!(parsed.poll_interval_ms, defaults.poll_interval_ms);
        assert_eq!(parsed.storage, defaults.storage);
    }

    #[test]
    fn test_init_creates_config_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("protected_routes"));
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "# existing").unwrap();

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_save_api_base_preserves_other_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "poll_interval_ms = 500\n").unwrap();

        Config::save_api_base_to(&config_path, "https://staging.example.test/").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.api_base, "https://staging.example.test");
        assert_eq!(config.poll_interval_ms, 500);
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# Base URL of the Hextok API"));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.callback_uri(), "hextok://oauth/callback");
    }
}
