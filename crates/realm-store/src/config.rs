//! Store configuration
//!
//! Locates the two data files and controls backup naming and read repair.
//! Values come from [`StoreConfig::default`], an [`Environment`] preset, or a
//! TOML file whose missing keys fall back to the defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (default)
    #[default]
    Development,
    /// Test runs; uses a distinct backup suffix
    Test,
    /// Production
    Production,
}

impl Environment {
    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: '{other}'")),
        }
    }
}

/// Data store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding both data files
    pub data_dir: PathBuf,
    /// Character document file name, relative to `data_dir`
    pub characters_file: PathBuf,
    /// Likes document file name, relative to `data_dir`
    pub likes_file: PathBuf,
    /// Suffix appended to a data file path to name its backup
    pub backup_suffix: String,
    /// Try the backup file before falling back to a default on a failed read
    pub restore_from_backup: bool,
}

impl StoreConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for an environment
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development | Environment::Production => Self::default(),
            Environment::Test => Self {
                backup_suffix: ".test.backup".to_string(),
                ..Self::default()
            },
        }
    }

    /// With data directory
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// With character file name
    #[inline]
    #[must_use]
    pub fn with_characters_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.characters_file = file.into();
        self
    }

    /// With likes file name
    #[inline]
    #[must_use]
    pub fn with_likes_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.likes_file = file.into();
        self
    }

    /// With backup suffix
    #[inline]
    #[must_use]
    pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    /// With backup restore on failed reads
    #[inline]
    #[must_use]
    pub fn with_restore_from_backup(mut self, enabled: bool) -> Self {
        self.restore_from_backup = enabled;
        self
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` if the text is not valid TOML for this struct
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if its content is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Full path of the character document
    #[inline]
    #[must_use]
    pub fn characters_path(&self) -> PathBuf {
        self.data_dir.join(&self.characters_file)
    }

    /// Full path of the likes document
    #[inline]
    #[must_use]
    pub fn likes_path(&self) -> PathBuf {
        self.data_dir.join(&self.likes_file)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            characters_file: PathBuf::from("succubi-data.json"),
            likes_file: PathBuf::from("likes-data.json"),
            backup_suffix: ".backup".to_string(),
            restore_from_backup: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let config = StoreConfig::new();
        assert_eq!(config.likes_path(), PathBuf::from("data/likes-data.json"));
        assert_eq!(
            config.characters_path(),
            PathBuf::from("data/succubi-data.json")
        );
        assert_eq!(config.backup_suffix, ".backup");
        assert!(!config.restore_from_backup);
    }

    #[test]
    fn test_environment_uses_own_backup_suffix() {
        let config = StoreConfig::for_environment(Environment::Test);
        assert_eq!(config.backup_suffix, ".test.backup");
        assert_eq!(
            StoreConfig::for_environment(Environment::Production),
            StoreConfig::default()
        );
    }

    #[test]
    fn builder_overrides() {
        let config = StoreConfig::new()
            .with_data_dir("/srv/realm")
            .with_likes_file("likes.json")
            .with_restore_from_backup(true);
        assert_eq!(config.likes_path(), PathBuf::from("/srv/realm/likes.json"));
        assert!(config.restore_from_backup);
    }

    #[test]
    fn toml_partial_overrides_keep_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/realm"
            backup_suffix = ".bak"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/realm"));
        assert_eq!(config.backup_suffix, ".bak");
        assert_eq!(config.likes_file, PathBuf::from("likes-data.json"));
    }

    #[test]
    fn toml_rejects_wrong_types() {
        assert!(StoreConfig::from_toml_str("restore_from_backup = \"yes\"").is_err());
    }

    #[test]
    fn load_missing_file() {
        let err = StoreConfig::load("/nonexistent/realm.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn environment_parsing() {
        assert_eq!("test".parse::<Environment>(), Ok(Environment::Test));
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::default().to_string(), "development");
    }
}
