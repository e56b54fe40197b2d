//! Application configuration.
//!
//! # Responsibility
//! - Deserialize runtime settings from TOML with a default for every field.
//! - Reject settings the services cannot run with.
//!
//! # Invariants
//! - A validated config has a non-empty mentor endpoint, a non-zero timeout
//!   and at least one transaction attempt.

use crate::repo::profile_repo::DEFAULT_MAX_TRANSACTION_ATTEMPTS;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_DATABASE_FILE: &str = "ascend.sqlite3";
const DEFAULT_MENTOR_ENDPOINT: &str = "http://localhost:8888/.netlify/functions/mentorChat";
const DEFAULT_MENTOR_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config syntax: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file holding local entries and bundled profiles.
    pub database_path: PathBuf,
    /// `trace|debug|info|warn|error`; `None` picks the build-mode default.
    pub log_level: Option<String>,
    /// Absolute directory for rolling logs; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub mentor: MentorSettings,
    pub remote: RemoteSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            log_level: None,
            log_dir: None,
            mentor: MentorSettings::default(),
            remote: RemoteSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentorSettings {
    pub endpoint: String,
    /// Exchanges slower than this count as failures.
    pub timeout_ms: u64,
}

impl Default for MentorSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MENTOR_ENDPOINT.to_string(),
            timeout_ms: DEFAULT_MENTOR_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Attempts per profile transaction before reporting unavailability.
    pub max_transaction_attempts: u32,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            max_transaction_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
        }
    }
}

impl AppConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mentor.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "mentor.endpoint cannot be empty".to_string(),
            ));
        }
        if self.mentor.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "mentor.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.remote.max_transaction_attempts == 0 {
            return Err(ConfigError::Invalid(
                "remote.max_transaction_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
