//! Configuration file for ~/.config/gator/config.toml.
//!
//! The file is optional: a missing file yields `Config::default()`. `login`
//! and `register` write `current_user_name` back through [`Config::save`].
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::ingest::PersistencePolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gator.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// The logged-in user, set by `login` and `register`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// `User-Agent` header for feed requests.
    pub user_agent: String,

    /// Per-request timeout in seconds. 0 falls back to the default.
    pub fetch_timeout_secs: u64,

    /// Consecutive persistence failures before `agg` gives up. 0 = never.
    pub halt_after_persistence_failures: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user_name: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            halt_after_persistence_failures: 0,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "database_path",
        "current_user_name",
        "user_agent",
        "fetch_timeout_secs",
        "halt_after_persistence_failures",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the configuration to `path` via a temp file and rename, so a
    /// crash never leaves a half-written file behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        use std::time::{SystemTime, UNIX_EPOCH};
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("toml.tmp.{:016x}", suffix));

        let result = (|| {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            drop(file);
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// The database file, falling back to `gator.db` inside `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("gator.db"))
    }

    pub fn fetch_timeout(&self) -> Duration {
        match self.fetch_timeout_secs {
            0 => DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    pub fn persistence_policy(&self) -> PersistencePolicy {
        PersistencePolicy::from_threshold(self.halt_after_persistence_failures)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.user_agent, "gator");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.persistence_policy(), PersistencePolicy::Continue);
        assert!(config.current_user_name.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gator_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = temp_dir("gator_config_test_empty");
        let path = dir.join("config.toml");
        std::fs::write(&path, "  \n").unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = temp_dir("gator_config_test_full");
        let path = dir.join("config.toml");
        let content = r#"
database_path = "/var/lib/gator/gator.db"
current_user_name = "kahya"
user_agent = "gator/test"
fetch_timeout_secs = 5
halt_after_persistence_failures = 3
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path(&dir),
            PathBuf::from("/var/lib/gator/gator.db")
        );
        assert_eq!(config.current_user_name.as_deref(), Some("kahya"));
        assert_eq!(config.user_agent, "gator/test");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.persistence_policy(),
            PersistencePolicy::from_threshold(3)
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = Config {
            fetch_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.fetch_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_database_path_defaults_next_to_config() {
        let config = Config::default();
        assert_eq!(
            config.database_path(Path::new("/home/u/.config/gator")),
            PathBuf::from("/home/u/.config/gator/gator.db")
        );
    }

    #[test]
    fn test_invalid_toml() {
        let dir = temp_dir("gator_config_test_invalid");
        let path = dir.join("config.toml");
        std::fs::write(&path, "user_agent = [unclosed").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let dir = temp_dir("gator_config_test_wrong_type");
        let path = dir.join("config.toml");
        std::fs::write(&path, "fetch_timeout_secs = \"thirty\"").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = temp_dir("gator_config_test_unknown");
        let path = dir.join("config.toml");
        std::fs::write(&path, "db_url = \"postgres://x\"\nuser_agent = \"ua\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.user_agent, "ua");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = temp_dir("gator_config_test_large");
        let path = dir.join("config.toml");
        let big = format!("# {}\n", "x".repeat(Config::MAX_FILE_SIZE as usize));
        std::fs::write(&path, big).unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::TooLarge(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_then_load() {
        let dir = temp_dir("gator_config_test_save");
        let path = dir.join("nested").join("config.toml");

        let config = Config {
            current_user_name: Some("holgith".into()),
            halt_after_persistence_failures: 2,
            ..Config::default()
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
        // No temp files left behind
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_overwrites() {
        let dir = temp_dir("gator_config_test_overwrite");
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.current_user_name = Some("a".into());
        config.save(&path).unwrap();
        config.current_user_name = Some("b".into());
        config.save(&path).unwrap();

        assert_eq!(
            Config::load(&path).unwrap().current_user_name.as_deref(),
            Some("b")
        );

        std::fs::remove_dir_all(&dir).ok();
    }
}
