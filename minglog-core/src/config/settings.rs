//! Settings loaded from the TOML configuration file.
//!
//! Every field is optional here; defaults live in [`super::links`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# minglog configuration file
# Located at: ~/.config/minglog/config.toml

[links]
# SQLite file shared with the module content stores.
# database_path = "/path/to/minglog.sqlite3"
# Create mirrored reverse edges for reference links.
bidirectional = true
# Number of items kept in the adjacency cache.
cache_capacity = 500

[sync]
# Seconds between consistency reconciliation runs.
interval_seconds = 30
# Apply auto-fixable repairs during reconciliation.
auto_fix = true
# Accept link proposals from content analysis.
auto_link_enabled = true
auto_link_min_strength = 0.6

[checker]
similarity_threshold = 0.6
remove_confidence = 0.5
max_suggestions = 3

[logging]
level = "info"
"#;

/// User-facing settings (non-sensitive, file-backed).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Link store configuration
    #[serde(default)]
    pub links: LinksToml,

    /// Synchronization orchestrator configuration
    #[serde(default)]
    pub sync: SyncToml,

    /// Consistency checker configuration
    #[serde(default)]
    pub checker: CheckerToml,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// `[links]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LinksToml {
    /// Path of the SQLite database holding link edges
    pub database_path: Option<String>,

    /// Whether reference links get a mirrored reverse edge
    pub bidirectional: Option<bool>,

    /// Adjacency cache capacity (items)
    pub cache_capacity: Option<usize>,
}

/// `[sync]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncToml {
    /// Reconciliation interval in seconds
    pub interval_seconds: Option<u64>,

    /// Apply auto-fixable repairs on each reconciliation
    pub auto_fix: Option<bool>,

    /// Accept edges proposed by content analysis
    pub auto_link_enabled: Option<bool>,

    /// Minimum proposal strength for auto-linking
    pub auto_link_min_strength: Option<f64>,
}

/// `[checker]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckerToml {
    /// Title similarity needed before a `replace` repair is offered
    pub similarity_threshold: Option<f64>,

    /// Confidence assigned to `remove` repairs
    pub remove_confidence: Option<f64>,

    /// Maximum suggestions kept per issue
    pub max_suggestions: Option<usize>,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error("Data directory not found")]
    DataDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        super::load_dotenv();
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/minglog/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("MINGLOG_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("minglog");

        Ok(config_dir.join("config.toml"))
    }

    /// Database path: the configured one, or `<data dir>/minglog/minglog.sqlite3`.
    pub fn database_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.links.database_path {
            return Ok(PathBuf::from(path));
        }
        let data_dir = dirs::data_dir().ok_or(SettingsError::DataDirNotFound)?;
        Ok(data_dir.join("minglog").join("minglog.sqlite3"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert!(settings.links.database_path.is_none());
        assert!(settings.links.bidirectional.is_none());
        assert!(settings.sync.interval_seconds.is_none());
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_default_config_toml_parses() {
        let settings = Settings::from_toml(DEFAULT_CONFIG_TOML).unwrap();

        assert_eq!(settings.links.bidirectional, Some(true));
        assert_eq!(settings.links.cache_capacity, Some(500));
        assert_eq!(settings.sync.interval_seconds, Some(30));
        assert_eq!(settings.sync.auto_link_min_strength, Some(0.6));
        assert_eq!(settings.checker.max_suggestions, Some(3));
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[sync]
interval_seconds = 5
"#;
        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(settings.sync.interval_seconds, Some(5));
        assert!(settings.sync.auto_fix.is_none());
        assert!(settings.checker.similarity_threshold.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.links.database_path = Some("/tmp/links.sqlite3".to_string());
        settings.sync.auto_fix = Some(false);
        settings.save_to_path(&path).unwrap();

        let loaded = Settings::from_toml(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            loaded.links.database_path.as_deref(),
            Some("/tmp/links.sqlite3")
        );
        assert_eq!(loaded.sync.auto_fix, Some(false));
        assert_eq!(
            loaded.database_path().unwrap(),
            PathBuf::from("/tmp/links.sqlite3")
        );
    }

    #[test]
    fn test_config_path_uses_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let value = dir.path().to_string_lossy().to_string();

        // SAFETY: test-scoped env mutation.
        unsafe { std::env::set_var("MINGLOG_CONFIG_DIR", &value) };
        let path = Settings::config_path().unwrap();
        // SAFETY: test-scoped env mutation cleanup.
        unsafe { std::env::remove_var("MINGLOG_CONFIG_DIR") };

        assert_eq!(path, dir.path().join("config.toml"));
    }
}
