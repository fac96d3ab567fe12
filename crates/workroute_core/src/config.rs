//! Engine configuration.
//!
//! # Responsibility
//! - Describe process-wide settings consumed by the engine: access-id case
//!   normalization, connection-management mode, busy timeout and logging.
//! - Load settings from TOML text or files.
//!
//! # Invariants
//! - Every field has a default, so an empty document is a valid configuration.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How connection scopes map onto SQLite transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionManagementMode {
    /// Every outermost call commits (or rolls back) on its own.
    #[default]
    Autocommit,
    /// The first call opens a transaction that stays open until the caller
    /// commits or rolls back.
    Explicit,
}

/// Process-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lowercase access ids when building authorization filters.
    pub lowercase_access_ids: bool,
    pub connection_mode: ConnectionManagementMode,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Optional file logging; `None` leaves logging to the host process.
    pub logging: Option<LoggingConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lowercase_access_ids: true,
            connection_mode: ConnectionManagementMode::Autocommit,
            busy_timeout_ms: 5_000,
            logging: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns a copy using the given connection-management mode.
    pub fn with_connection_mode(mut self, mode: ConnectionManagementMode) -> Self {
        self.connection_mode = mode;
        self
    }

    /// Returns a copy with access-id lowercasing switched on or off.
    pub fn with_lowercase_access_ids(mut self, enabled: bool) -> Self {
        self.lowercase_access_ids = enabled;
        self
    }
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionManagementMode, EngineConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config should parse");
        assert_eq!(config, EngineConfig::default());
        assert!(config.lowercase_access_ids);
        assert_eq!(config.connection_mode, ConnectionManagementMode::Autocommit);
    }

    #[test]
    fn parses_all_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            lowercase_access_ids = false
            connection_mode = "explicit"
            busy_timeout_ms = 250

            [logging]
            level = "debug"
            directory = "/var/log/workroute"
            "#,
        )
        .expect("config should parse");

        assert!(!config.lowercase_access_ids);
        assert_eq!(config.connection_mode, ConnectionManagementMode::Explicit);
        assert_eq!(config.busy_timeout().as_millis(), 250);
        let logging = config.logging.expect("logging section should be present");
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.directory, PathBuf::from("/var/log/workroute"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = EngineConfig::from_toml_str(r#"connection_mode = "sometimes""#)
            .expect_err("unknown mode must fail");
        assert!(err.to_string().contains("invalid engine config"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file("/definitely/not/here/workroute.toml")
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("/definitely/not/here/workroute.toml"));
    }
}
