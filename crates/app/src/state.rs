use std::path::PathBuf;
use std::str::FromStr;
use std::{fs, io};

use pubstore::PublishedStorageConfig;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "pubstore";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where and how files are published
    #[serde(default)]
    pub storage: PublishedStorageConfig,
    /// Default log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: PublishedStorageConfig::default(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path the config was read from
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// Default config file location, `~/.pubstore/config.toml`
    pub fn default_config_path() -> Result<PathBuf, StateError> {
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)).join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. The default location falls back to
    /// built-in defaults when no file is there.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let explicit = custom_path.is_some();
        let config_path = match custom_path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        let config = match fs::read_to_string(&config_path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => AppConfig::default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::MissingFile(config_path))
            }
            Err(e) => return Err(e.into()),
        };
        config.level()?;

        Ok(Self {
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("config file {} does not exist", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubstore::ObjectStoreConfig;

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            log_level = "debug"

            [storage]
            prefix = "debian"

            [storage.backend]
            type = "memory"

            [storage.copy]
            max_polls = 10
            "#,
        )
        .unwrap();

        let state = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(state.config_path, path);
        assert_eq!(state.config.level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(state.config.storage.prefix, "debian");
        assert_eq!(state.config.storage.backend, ObjectStoreConfig::Memory);
        assert_eq!(state.config.storage.copy.max_polls, Some(10));
        assert!(state.config.log_dir.is_none());
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = AppState::load(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, StateError::MissingFile(_)));
    }

    #[test]
    fn test_invalid_log_level() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "log_level = \"loud\"").unwrap();

        let err = AppState::load(Some(path)).unwrap_err();
        assert!(matches!(err, StateError::InvalidLogLevel(_)));
    }
}
